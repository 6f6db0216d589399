//! Wire messages exchanged between the primary and companion device.
//!
//! Messages are transient: they exist on the wire and in short-lived
//! in-memory queues, correlated across the pair by `session_id`.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Payload variants of a relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayMessageKind {
    /// Recorded utterance traveling to the processing device.
    AudioPayload {
        audio: Vec<u8>,
        captured_at_ms: u64,
    },
    /// Transport confirmation, sent immediately on receipt of an
    /// `AudioPayload`. Not the final answer.
    Ack,
    /// Final answer, pushed unsolicited once processing completes.
    Response {
        text: String,
        audio: Option<Vec<u8>>,
        success: bool,
    },
    /// Processing-side failure report.
    Error { message: String },
    /// Informational state notification (listening, processing, ...).
    StatusUpdate { status: String },
}

impl RelayMessageKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RelayMessageKind::AudioPayload { .. } => "audio_payload",
            RelayMessageKind::Ack => "ack",
            RelayMessageKind::Response { .. } => "response",
            RelayMessageKind::Error { .. } => "error",
            RelayMessageKind::StatusUpdate { .. } => "status_update",
        }
    }
}

/// One message on the relay channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub session_id: Uuid,
    pub kind: RelayMessageKind,
    pub timestamp_ms: u64,
}

impl RelayMessage {
    pub fn new(session_id: Uuid, kind: RelayMessageKind) -> Self {
        Self {
            session_id,
            kind,
            timestamp_ms: current_timestamp_ms(),
        }
    }

    pub fn audio_payload(session_id: Uuid, audio: Vec<u8>, captured_at_ms: u64) -> Self {
        Self::new(
            session_id,
            RelayMessageKind::AudioPayload {
                audio,
                captured_at_ms,
            },
        )
    }

    pub fn ack(session_id: Uuid) -> Self {
        Self::new(session_id, RelayMessageKind::Ack)
    }

    pub fn response(
        session_id: Uuid,
        text: impl Into<String>,
        audio: Option<Vec<u8>>,
        success: bool,
    ) -> Self {
        Self::new(
            session_id,
            RelayMessageKind::Response {
                text: text.into(),
                audio,
                success,
            },
        )
    }

    pub fn error(session_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(
            session_id,
            RelayMessageKind::Error {
                message: message.into(),
            },
        )
    }

    pub fn status(session_id: Uuid, status: impl Into<String>) -> Self {
        Self::new(
            session_id,
            RelayMessageKind::StatusUpdate {
                status: status.into(),
            },
        )
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
