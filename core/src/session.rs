//! Voice session lifecycle.
//!
//! A session is one user interaction: wake, capture, processing, response.
//! The state machine is the single authority on what the interaction is doing
//! right now; capture, routing, and relay results all funnel through it.
//! Results are correlated by session id, and anything tagged with a stale id
//! is discarded without a state change.
//!
//! The machine is passive: callers supply `Instant`s, so time-dependent
//! behavior is deterministic under test.

use crate::config::SessionConfig;
use crate::telemetry::Telemetry;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// States of a voice interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing happening; waiting for a wake trigger.
    Idle,
    /// Capturing the user's utterance.
    Listening,
    /// Routing and executing the utterance.
    Processing,
    /// Holding a delivered response for the user.
    Responding,
    /// Holding a user-facing error message.
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Responding => "responding",
            SessionState::Error => "error",
        }
    }
}

/// One observed state change, delivered to subscribers.
#[derive(Debug, Clone)]
pub struct SessionTransition {
    pub session_id: Uuid,
    pub from: SessionState,
    pub to: SessionState,
}

/// Outcome of a stop-capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCapture {
    /// Capture ran long enough; the session moved to `Processing`.
    Transitioned,
    /// The stop arrived before the minimum capture duration; it is recorded
    /// and applied by `try_finish_capture` once the minimum elapses.
    Deferred(Duration),
    /// There was no active capture to stop.
    Ignored,
}

/// Terminal payload held while `Responding`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldResponse {
    pub text: String,
    pub success: bool,
}

/// Session state machine for one device.
pub struct VoiceSessionStateMachine {
    config: SessionConfig,
    telemetry: Arc<Telemetry>,
    state: SessionState,
    session_id: Option<Uuid>,
    capture_started: Option<Instant>,
    pending_stop: bool,
    held_response: Option<HeldResponse>,
    settled_at: Option<Instant>,
    subscribers: Vec<Sender<SessionTransition>>,
}

impl VoiceSessionStateMachine {
    pub fn new(config: SessionConfig, telemetry: Arc<Telemetry>) -> Self {
        Self {
            config,
            telemetry,
            state: SessionState::Idle,
            session_id: None,
            capture_started: None,
            pending_stop: false,
            held_response: None,
            settled_at: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the current session, if one is active.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// The response currently being shown, if any.
    pub fn held_response(&self) -> Option<&HeldResponse> {
        self.held_response.as_ref()
    }

    /// Receive every subsequent state transition. Disconnected subscribers
    /// are pruned lazily on the next broadcast.
    pub fn subscribe(&mut self) -> Receiver<SessionTransition> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Begin a new session. Valid from any state: a wake trigger always wins,
    /// and whatever was in flight becomes stale through the id change.
    pub fn start_session(&mut self, now: Instant) -> Uuid {
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.capture_started = Some(now);
        self.pending_stop = false;
        self.held_response = None;
        self.settled_at = None;
        self.transition(SessionState::Listening);
        session_id
    }

    /// Request the end of capture.
    ///
    /// Stops arriving before the minimum capture duration are deferred rather
    /// than dropped, so an eager end-of-speech detector cannot produce an
    /// empty utterance.
    pub fn stop_capture(&mut self, now: Instant) -> StopCapture {
        if self.state != SessionState::Listening {
            return StopCapture::Ignored;
        }
        let started = match self.capture_started {
            Some(started) => started,
            None => return StopCapture::Ignored,
        };
        let elapsed = now.saturating_duration_since(started);
        let min_capture = self.config.min_capture();
        if elapsed < min_capture {
            self.pending_stop = true;
            return StopCapture::Deferred(min_capture - elapsed);
        }
        self.transition(SessionState::Processing);
        StopCapture::Transitioned
    }

    /// Apply a previously deferred stop once the minimum capture duration has
    /// elapsed. No-op otherwise.
    pub fn try_finish_capture(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Listening || !self.pending_stop {
            return false;
        }
        let started = match self.capture_started {
            Some(started) => started,
            None => return false,
        };
        if now.saturating_duration_since(started) < self.config.min_capture() {
            return false;
        }
        self.pending_stop = false;
        self.transition(SessionState::Processing);
        true
    }

    /// Deliver the final response for `session_id`. Only accepted while
    /// `Processing` the same session; anything else is stale and discarded.
    pub fn accept_response(
        &mut self,
        session_id: Uuid,
        text: impl Into<String>,
        success: bool,
        now: Instant,
    ) -> bool {
        if self.state != SessionState::Processing || self.session_id != Some(session_id) {
            self.telemetry
                .log_stale_discard(&session_id.to_string(), "session_response");
            return false;
        }
        self.held_response = Some(HeldResponse {
            text: text.into(),
            success,
        });
        self.settled_at = Some(now);
        self.transition(SessionState::Responding);
        true
    }

    /// Report a failure for `session_id` with a user-facing message. Subject
    /// to the same staleness rule as `accept_response`.
    pub fn fail(&mut self, session_id: Uuid, user_message: impl Into<String>, now: Instant) -> bool {
        if self.state != SessionState::Processing || self.session_id != Some(session_id) {
            self.telemetry
                .log_stale_discard(&session_id.to_string(), "session_error");
            return false;
        }
        self.held_response = Some(HeldResponse {
            text: user_message.into(),
            success: false,
        });
        self.settled_at = Some(now);
        self.transition(SessionState::Error);
        true
    }

    /// True once a held response or error has been shown for the configured
    /// hold duration and the session can return to idle on its own.
    pub fn should_auto_dismiss(&self, now: Instant) -> bool {
        if !matches!(self.state, SessionState::Responding | SessionState::Error) {
            return false;
        }
        match self.settled_at {
            Some(settled) => now.saturating_duration_since(settled) >= self.config.response_hold(),
            None => false,
        }
    }

    /// Dismiss the held response or error and return to idle.
    pub fn dismiss(&mut self) {
        if matches!(self.state, SessionState::Responding | SessionState::Error) {
            self.held_response = None;
            self.settled_at = None;
            self.session_id = None;
            self.transition(SessionState::Idle);
        }
    }

    /// Abort the session from any state. The abandoned session's id becomes
    /// stale immediately.
    pub fn cancel(&mut self) {
        if self.state != SessionState::Idle {
            self.held_response = None;
            self.settled_at = None;
            self.pending_stop = false;
            self.session_id = None;
            self.transition(SessionState::Idle);
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        let session_id = self.session_id.unwrap_or_else(Uuid::nil);
        self.telemetry
            .log_session_transition(&session_id.to_string(), from.as_str(), to.as_str());
        let event = SessionTransition {
            session_id,
            from,
            to,
        };
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
