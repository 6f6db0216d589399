//! Prelude module for convenient imports.
//!
//! Re-exports the types a host needs to wire up the core with a single
//! import.
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_core::prelude::*;
//!
//! let orchestrator = Orchestrator::new(
//!     CoreConfig::default(),
//!     DeviceRole::Primary,
//!     Arc::new(KeywordIntentSource::new()),
//!     Arc::new(StaticProbe::healthy()),
//! )?;
//! let response = orchestrator.handle_utterance(&utterance)?;
//! ```

// ============================================================================
// Orchestration
// ============================================================================

pub use crate::orchestrator::{CapturedUtterance, DeviceRole, Orchestrator, VoiceResponse};

// ============================================================================
// Routing & Learning
// ============================================================================

pub use crate::routing::{
    JsonFileStore, LearningStore, MemoryStore, Outcome, RoutingDecision, RoutingEngine,
    RoutingStrategy, StrategyLearner, ThresholdSnapshot,
};

// ============================================================================
// Intents & Offline Handling
// ============================================================================

pub use crate::intent::{IntentClassification, IntentLabel, IntentSource, KeywordIntentSource};
pub use crate::offline::{OfflineHandler, OfflineHandlerRegistry, OfflineResponse};

// ============================================================================
// Device Pair
// ============================================================================

pub use crate::relay::{CompanionRelay, RelayResponder, RelayResponse, RelayTransport};
pub use crate::session::{SessionState, SessionTransition, VoiceSessionStateMachine};
pub use crate::device::{DeviceStateProbe, DeviceStateSnapshot, StaticProbe};

// ============================================================================
// Execution Seams
// ============================================================================

pub use crate::execution::{ExecutionError, ExecutionResponse, OnDeviceModel, RemoteExecutor};

// ============================================================================
// Configuration, Errors, Telemetry
// ============================================================================

pub use crate::config::CoreConfig;
pub use crate::error::{TandemError, TandemResult};
pub use crate::telemetry::{LogLevel, Telemetry};
