//! Telemetry module - Observability for routing, relay, learner, and session events.
//!
//! This module provides:
//! - `Telemetry` - Structured JSON event logging through the `log` facade
//! - `Severity` / `LogLevel` - Event severity and process-global verbosity
//! - `should_log` - Cheap gate used by hot paths before formatting events

mod events;

pub use events::{
    get_global_log_level, set_global_log_level, should_log, LogLevel, Severity, Telemetry,
    TelemetryEntry,
};
