//! Companion relay - Moves utterances and responses between the device pair.
//!
//! One relay attempt walks `Idle → Sending → AwaitingAck → AwaitingResponse`
//! and terminates in `Delivered`, `TimedOut`, or `Failed`. `TimedOut` and
//! `Failed` are both "relay unavailable" to the caller, which then performs
//! direct processing on the originating device. At most one attempt is in
//! flight per device pair; a newer attempt supersedes the old one and the
//! old one's late messages are discarded by session-id mismatch.

use super::message::{RelayMessage, RelayMessageKind};
use super::transport::{RelayTransport, TransportEvent};
use crate::config::RelayConfig;
use crate::error::{TandemError, TandemResult};
use crate::telemetry::{Severity, Telemetry};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// State of one relay attempt, for telemetry and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAttemptState {
    Idle,
    Sending,
    AwaitingAck,
    AwaitingResponse,
    Delivered,
    TimedOut,
    Failed,
}

impl RelayAttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayAttemptState::Idle => "idle",
            RelayAttemptState::Sending => "sending",
            RelayAttemptState::AwaitingAck => "awaiting_ack",
            RelayAttemptState::AwaitingResponse => "awaiting_response",
            RelayAttemptState::Delivered => "delivered",
            RelayAttemptState::TimedOut => "timed_out",
            RelayAttemptState::Failed => "failed",
        }
    }
}

/// Errors from a relay attempt.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The cached reachability flag says the peer is gone; nothing was sent.
    #[error("companion peer unreachable")]
    Unreachable,

    /// No transport confirmation within the ack window.
    #[error("no ack from companion within {0:?}")]
    AckTimeout(Duration),

    /// Acked, but no final response within the response window.
    #[error("no response from companion within {0:?}")]
    ResponseTimeout(Duration),

    /// The transport rejected the send, or the peer reported an error.
    #[error("relay transport failure: {0}")]
    Transport(String),

    /// A newer session replaced this attempt while it was waiting.
    #[error("relay attempt superseded by a newer session")]
    Superseded,
}

impl RelayError {
    /// Map to the crate-level taxonomy for session error reporting.
    pub fn to_core_error(&self) -> TandemError {
        match self {
            RelayError::Unreachable => TandemError::RelayUnreachable,
            RelayError::AckTimeout(_) | RelayError::ResponseTimeout(_) => {
                TandemError::RelayTimeout
            }
            RelayError::Transport(message) => TandemError::RemoteNetworkFailure(message.clone()),
            RelayError::Superseded => TandemError::StaleSession(Uuid::nil()),
        }
    }
}

/// Final answer carried back over the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub text: String,
    pub audio: Option<Vec<u8>>,
    pub success: bool,
}

/// Processing hook on the receiving device: given a relayed utterance,
/// produce the final response. Invoked off the inbox thread.
pub trait RelayResponder: Send + Sync {
    fn process(&self, session_id: Uuid, audio: &[u8]) -> RelayResponse;
}

struct AttemptHandle {
    session_id: Uuid,
    sender: Sender<RelayMessage>,
}

/// The relay endpoint living on one device of the pair.
pub struct CompanionRelay {
    transport: Arc<dyn RelayTransport>,
    config: RelayConfig,
    telemetry: Arc<Telemetry>,
    reachable: Arc<AtomicBool>,
    current: Arc<Mutex<Option<AttemptHandle>>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CompanionRelay {
    /// Construct the relay and spawn its inbox worker. `responder` is
    /// required on devices that answer relayed utterances; pure senders can
    /// pass `None`.
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        responder: Option<Arc<dyn RelayResponder>>,
        config: RelayConfig,
        telemetry: Arc<Telemetry>,
    ) -> TandemResult<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        transport.register_inbound(inbox_tx);

        let reachable = Arc::new(AtomicBool::new(true));
        let current: Arc<Mutex<Option<AttemptHandle>>> = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_state = InboxWorker {
            transport: Arc::clone(&transport),
            responder,
            reachable: Arc::clone(&reachable),
            current: Arc::clone(&current),
            shutdown: Arc::clone(&shutdown),
            telemetry: Arc::clone(&telemetry),
        };

        let worker = thread::Builder::new()
            .name("companion-relay-inbox".to_string())
            .spawn(move || worker_state.run(inbox_rx))
            .map_err(|err| TandemError::Worker(err.to_string()))?;

        Ok(Self {
            transport,
            config,
            telemetry,
            reachable,
            current,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Cached reachability of the peer, updated from transport events.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Relay one utterance to the peer and wait for its response.
    ///
    /// Blocks the calling thread for at most `T_ack + T_resp`. Any error is
    /// "relay unavailable" to the caller except `Superseded`, which means a
    /// newer session took over and this result must be discarded.
    pub fn relay_utterance(
        &self,
        session_id: Uuid,
        audio: Vec<u8>,
        captured_at_ms: u64,
    ) -> Result<RelayResponse, RelayError> {
        if !self.is_reachable() {
            self.log_transition(session_id, RelayAttemptState::Failed, Some("unreachable"));
            return Err(RelayError::Unreachable);
        }

        let (attempt_tx, attempt_rx) = mpsc::channel();
        self.install_attempt(session_id, attempt_tx);

        self.log_transition(session_id, RelayAttemptState::Sending, None);
        if let Err(err) = self
            .transport
            .send(RelayMessage::audio_payload(session_id, audio, captured_at_ms))
        {
            self.clear_attempt(session_id);
            self.log_transition(session_id, RelayAttemptState::Failed, Some("send_error"));
            return Err(RelayError::Transport(err.to_string()));
        }

        self.log_transition(session_id, RelayAttemptState::AwaitingAck, None);
        match self.await_ack(session_id, &attempt_rx) {
            Ok(Some(response)) => {
                // Response arrived before (or instead of) the ack.
                self.clear_attempt(session_id);
                self.log_transition(session_id, RelayAttemptState::Delivered, None);
                return Ok(response);
            }
            Ok(None) => {}
            Err(err) => return Err(err),
        }

        self.log_transition(session_id, RelayAttemptState::AwaitingResponse, None);
        self.await_response(session_id, &attempt_rx)
    }

    /// Discard the in-flight attempt for `session_id`, if any. Its eventual
    /// late response will be dropped by session-id mismatch.
    pub fn cancel_session(&self, session_id: Uuid) {
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard
            .as_ref()
            .map(|handle| handle.session_id == session_id)
            .unwrap_or(false)
        {
            *guard = None;
            self.telemetry.log_event(
                Severity::Debug,
                "relay_attempt_cancelled",
                json!({ "session_id": session_id.to_string() }),
            );
        }
    }

    /// Stop the inbox worker and join it.
    pub fn shutdown(mut self) -> TandemResult<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| TandemError::Worker("relay inbox worker panicked".to_string()))?;
        }
        Ok(())
    }

    fn install_attempt(&self, session_id: Uuid, sender: Sender<RelayMessage>) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some(previous) = guard.take() {
                // Dropping the previous handle disconnects its channel; the
                // superseded attempt observes that as `Superseded`.
                self.telemetry.log_event(
                    Severity::Debug,
                    "relay_attempt_superseded",
                    json!({
                        "previous_session": previous.session_id.to_string(),
                        "new_session": session_id.to_string(),
                    }),
                );
            }
            *guard = Some(AttemptHandle { session_id, sender });
        }
    }

    fn clear_attempt(&self, session_id: Uuid) {
        if let Ok(mut guard) = self.current.lock() {
            if guard
                .as_ref()
                .map(|handle| handle.session_id == session_id)
                .unwrap_or(false)
            {
                *guard = None;
            }
        }
    }

    /// Wait for the ack. Returns `Ok(Some(response))` if the response beat
    /// the ack, `Ok(None)` once acked.
    fn await_ack(
        &self,
        session_id: Uuid,
        attempt_rx: &Receiver<RelayMessage>,
    ) -> Result<Option<RelayResponse>, RelayError> {
        let timeout = self.config.ack_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.clear_attempt(session_id);
                self.log_transition(session_id, RelayAttemptState::TimedOut, Some("ack"));
                return Err(RelayError::AckTimeout(timeout));
            }
            match attempt_rx.recv_timeout(remaining) {
                Ok(message) => match message.kind {
                    RelayMessageKind::Ack => return Ok(None),
                    RelayMessageKind::Response {
                        text,
                        audio,
                        success,
                    } => {
                        return Ok(Some(RelayResponse {
                            text,
                            audio,
                            success,
                        }))
                    }
                    RelayMessageKind::Error { message } => {
                        self.clear_attempt(session_id);
                        self.log_transition(
                            session_id,
                            RelayAttemptState::Failed,
                            Some("peer_error"),
                        );
                        return Err(RelayError::Transport(message));
                    }
                    _ => continue,
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(RelayError::Superseded),
            }
        }
    }

    fn await_response(
        &self,
        session_id: Uuid,
        attempt_rx: &Receiver<RelayMessage>,
    ) -> Result<RelayResponse, RelayError> {
        let timeout = self.config.response_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.clear_attempt(session_id);
                self.log_transition(session_id, RelayAttemptState::TimedOut, Some("response"));
                return Err(RelayError::ResponseTimeout(timeout));
            }
            match attempt_rx.recv_timeout(remaining) {
                Ok(message) => match message.kind {
                    RelayMessageKind::Response {
                        text,
                        audio,
                        success,
                    } => {
                        self.clear_attempt(session_id);
                        self.log_transition(session_id, RelayAttemptState::Delivered, None);
                        return Ok(RelayResponse {
                            text,
                            audio,
                            success,
                        });
                    }
                    RelayMessageKind::Error { message } => {
                        self.clear_attempt(session_id);
                        self.log_transition(
                            session_id,
                            RelayAttemptState::Failed,
                            Some("peer_error"),
                        );
                        return Err(RelayError::Transport(message));
                    }
                    _ => continue,
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(RelayError::Superseded),
            }
        }
    }

    fn log_transition(&self, session_id: Uuid, state: RelayAttemptState, detail: Option<&str>) {
        self.telemetry
            .log_relay_transition(&session_id.to_string(), state.as_str(), detail);
    }
}

impl Drop for CompanionRelay {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct InboxWorker {
    transport: Arc<dyn RelayTransport>,
    responder: Option<Arc<dyn RelayResponder>>,
    reachable: Arc<AtomicBool>,
    current: Arc<Mutex<Option<AttemptHandle>>>,
    shutdown: Arc<AtomicBool>,
    telemetry: Arc<Telemetry>,
}

impl InboxWorker {
    fn run(self, inbox: Receiver<TransportEvent>) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match inbox.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::ReachabilityChanged(up) => {
                self.reachable.store(up, Ordering::SeqCst);
                self.telemetry.log_event(
                    Severity::Info,
                    "relay_reachability_changed",
                    json!({ "reachable": up }),
                );
            }
            TransportEvent::Message(message) => self.dispatch_message(message),
        }
    }

    fn dispatch_message(&self, message: RelayMessage) {
        match &message.kind {
            RelayMessageKind::AudioPayload { audio, .. } => {
                self.serve_payload(message.session_id, audio.clone())
            }
            RelayMessageKind::StatusUpdate { status } => {
                self.telemetry.log_event(
                    Severity::Debug,
                    "relay_status_update",
                    json!({
                        "session_id": message.session_id.to_string(),
                        "status": status,
                    }),
                );
            }
            RelayMessageKind::Ack
            | RelayMessageKind::Response { .. }
            | RelayMessageKind::Error { .. } => self.forward_to_attempt(message),
        }
    }

    /// Route ack/response/error to the in-flight attempt, or drop it if the
    /// session is no longer current.
    fn forward_to_attempt(&self, message: RelayMessage) {
        let guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        match guard.as_ref() {
            Some(handle) if handle.session_id == message.session_id => {
                let _ = handle.sender.send(message);
            }
            _ => {
                self.telemetry
                    .log_stale_discard(&message.session_id.to_string(), message.kind_name());
            }
        }
    }

    /// Receiving side: ack immediately, process independently, push the
    /// response as a new unsolicited message.
    fn serve_payload(&self, session_id: Uuid, audio: Vec<u8>) {
        if let Err(err) = self.transport.send(RelayMessage::ack(session_id)) {
            self.telemetry.log_event(
                Severity::Warn,
                "relay_ack_send_failed",
                json!({
                    "session_id": session_id.to_string(),
                    "error": err.to_string(),
                }),
            );
            return;
        }

        let responder = match &self.responder {
            Some(responder) => Arc::clone(responder),
            None => {
                let _ = self
                    .transport
                    .send(RelayMessage::error(session_id, "no responder on this device"));
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        // Processing can take seconds; keep the inbox thread free for
        // reachability updates.
        let _ = thread::Builder::new()
            .name("companion-relay-responder".to_string())
            .spawn(move || {
                let response = responder.process(session_id, &audio);
                let _ = transport.send(RelayMessage::response(
                    session_id,
                    response.text,
                    response.audio,
                    response.success,
                ));
            });
    }
}
