//! Offline handler registry - deterministic, network-free responders.
//!
//! A small set of well-known intents (time, arithmetic, device info,
//! greetings) is answered synchronously with bounded latency and no I/O
//! beyond the local clock and device counters. A handler that cannot answer
//! its input returns a typed failure, which the orchestrator treats as
//! "Offline ineligible after the fact" and escalates to the next eligible
//! strategy instead of surfacing a user-facing error.

pub mod handlers;

use crate::device::DeviceStateProbe;
use crate::intent::IntentLabel;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use handlers::{ArithmeticHandler, ClockHandler, DeviceInfoHandler, GreetingHandler};

/// Response produced by an offline handler.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineResponse {
    pub text: String,
}

impl OfflineResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Typed failure from the offline path.
#[derive(Debug, Error)]
pub enum OfflineHandlerError {
    /// No responder registered for this intent.
    #[error("no offline handler for intent '{0}'")]
    NoHandler(IntentLabel),

    /// The handler owns this intent but could not answer this utterance
    /// (for example, the arithmetic parser rejected the expression).
    #[error("offline handler could not answer: {0}")]
    CannotAnswer(String),
}

/// One deterministic responder.
pub trait OfflineHandler: Send + Sync {
    /// The intent this handler owns.
    fn label(&self) -> IntentLabel;

    /// Answer `raw_text`, or return `CannotAnswer` if it does not parse.
    fn handle(&self, raw_text: &str) -> Result<OfflineResponse, OfflineHandlerError>;
}

/// Registry mapping deterministic intents to their responders.
pub struct OfflineHandlerRegistry {
    handlers: HashMap<IntentLabel, Box<dyn OfflineHandler>>,
}

impl OfflineHandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Create a registry with the standard handlers installed.
    pub fn with_defaults(probe: Arc<dyn DeviceStateProbe>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ClockHandler::new()));
        registry.register(Box::new(ArithmeticHandler::new()));
        registry.register(Box::new(DeviceInfoHandler::new(probe)));
        registry.register(Box::new(GreetingHandler::new()));
        registry
    }

    /// Install a handler, replacing any previous one for the same intent.
    pub fn register(&mut self, handler: Box<dyn OfflineHandler>) {
        self.handlers.insert(handler.label(), handler);
    }

    /// Whether a responder exists for this intent.
    pub fn can_handle(&self, label: IntentLabel) -> bool {
        self.handlers.contains_key(&label)
    }

    /// Dispatch to the responder for `label`.
    pub fn handle(
        &self,
        label: IntentLabel,
        raw_text: &str,
    ) -> Result<OfflineResponse, OfflineHandlerError> {
        match self.handlers.get(&label) {
            Some(handler) => handler.handle(raw_text),
            None => Err(OfflineHandlerError::NoHandler(label)),
        }
    }

    /// Terminal responder used when no strategy is eligible. Always succeeds;
    /// routing here is a fallback, not a failure.
    pub fn fallback_response(&self) -> OfflineResponse {
        OfflineResponse::new("Sorry, I can't help with that right now.")
    }
}

impl Default for OfflineHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticProbe;

    fn default_registry() -> OfflineHandlerRegistry {
        OfflineHandlerRegistry::with_defaults(Arc::new(StaticProbe::healthy()))
    }

    #[test]
    fn test_defaults_cover_deterministic_set() {
        let registry = default_registry();
        assert!(registry.can_handle(IntentLabel::Time));
        assert!(registry.can_handle(IntentLabel::Arithmetic));
        assert!(registry.can_handle(IntentLabel::DeviceInfo));
        assert!(registry.can_handle(IntentLabel::Greeting));
        assert!(!registry.can_handle(IntentLabel::Weather));
    }

    #[test]
    fn test_missing_handler_is_typed() {
        let registry = OfflineHandlerRegistry::new();
        let err = registry.handle(IntentLabel::Time, "what time is it").unwrap_err();
        assert!(matches!(err, OfflineHandlerError::NoHandler(IntentLabel::Time)));
    }

    #[test]
    fn test_fallback_response_is_nonempty() {
        let registry = default_registry();
        assert!(!registry.fallback_response().text.is_empty());
    }
}
