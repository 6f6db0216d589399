//! Tandem Core - Voice-command routing for a cooperating device pair.
//!
//! The core decides, per spoken command, where execution happens (offline
//! responder, on-device model, remote service, or a hybrid of both), adapts
//! its confidence thresholds from observed outcomes, and moves work between
//! the two devices over an unreliable relay channel. Platform concerns -
//! audio capture, speech recognition, UI - stay in the host; the core is
//! plain Rust with injected seams.
//!
//! ## Module Organization
//!
//! ### Routing & Learning
//! - [`routing`] - Strategy selection and adaptive threshold learning
//! - [`intent`] - Intent labels, classifications, and the classifier seam
//!
//! ### Execution
//! - [`orchestrator`] - Per-utterance coordination, fallback chains
//! - [`execution`] - Remote/on-device backend seams and budget enforcement
//! - [`offline`] - Deterministic network-free responders
//!
//! ### Device Pair
//! - [`relay`] - Message protocol between the primary and companion device
//! - [`session`] - Voice session lifecycle state machine
//! - [`device`] - Device-state snapshots and the probing seam
//!
//! ### Support
//! - [`config`] - Tunable constants, YAML/JSON loadable
//! - [`error`] - Crate-level error taxonomy and user-facing messages
//! - [`telemetry`] - Structured event emission

// ============================================================================
// Routing & Learning
// ============================================================================

/// Routing engine, strategy learner, and learning-state persistence
pub mod routing;

/// Intent labels and the classifier seam
pub mod intent;

// ============================================================================
// Execution
// ============================================================================

/// Per-utterance coordination across routing, execution, relay, and learning
pub mod orchestrator;

/// Execution backend seams and per-strategy budgets
pub mod execution;

/// Offline handler registry (time, arithmetic, device info, greetings)
pub mod offline;

// ============================================================================
// Device Pair
// ============================================================================

/// Companion relay protocol and transports
pub mod relay;

/// Voice session state machine
pub mod session;

/// Device-state snapshots and probes
pub mod device;

// ============================================================================
// Support
// ============================================================================

/// Configuration sections with shipped defaults
pub mod config;

/// Error taxonomy
pub mod error;

/// Structured telemetry events
pub mod telemetry;

/// Convenience re-exports
pub mod prelude;
