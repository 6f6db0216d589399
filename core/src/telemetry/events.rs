//! Structured event logging for the voice routing core.
//!
//! Events are emitted as single-line JSON through the `log` facade so host
//! applications can route them to their own sinks. A process-global log level
//! gates emission independently of the host's `log` configuration.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info => 1,
            Severity::Warn => 2,
            Severity::Error => 3,
        }
    }
}

/// Process-wide verbosity threshold for telemetry emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Emit nothing.
    Silent,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational events and above (default).
    Info,
    /// Everything, including per-message relay traffic.
    Debug,
}

impl LogLevel {
    fn min_rank(&self) -> u8 {
        match self {
            LogLevel::Silent => u8::MAX,
            LogLevel::Error => 3,
            LogLevel::Warn => 2,
            LogLevel::Info => 1,
            LogLevel::Debug => 0,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Silent,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            4 => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn as_u8(&self) -> u8 {
        match self {
            LogLevel::Silent => 0,
            LogLevel::Error => 1,
            LogLevel::Warn => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
        }
    }
}

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(3); // Info

/// Set the process-global telemetry verbosity.
pub fn set_global_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level.as_u8(), Ordering::Relaxed);
}

/// Get the process-global telemetry verbosity.
pub fn get_global_log_level() -> LogLevel {
    LogLevel::from_u8(GLOBAL_LOG_LEVEL.load(Ordering::Relaxed))
}

/// Check whether an event of the given severity should be emitted.
pub fn should_log(severity: Severity) -> bool {
    severity.rank() >= get_global_log_level().min_rank()
}

/// A single telemetry entry as emitted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub severity: String,
    pub event: String,
    pub timestamp: String,
    pub fields: serde_json::Value,
}

/// Telemetry emitter shared across core components.
///
/// Construct with [`Telemetry::with_enabled(false)`] to silence a component
/// tree entirely (used by tests).
pub struct Telemetry {
    enabled: bool,
}

impl Telemetry {
    /// Create an enabled telemetry emitter.
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Create an emitter with an explicit enabled flag.
    pub fn with_enabled(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Emit a structured event if the global level allows it.
    pub fn log_event(&self, severity: Severity, event: &str, fields: serde_json::Value) {
        if !self.enabled || !should_log(severity) {
            return;
        }
        let entry = TelemetryEntry {
            severity: severity.as_str().to_string(),
            event: event.to_string(),
            timestamp: iso8601_now(),
            fields,
        };
        let line = serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string());
        match severity {
            Severity::Debug => log::debug!("{}", line),
            Severity::Info => log::info!("{}", line),
            Severity::Warn => log::warn!("{}", line),
            Severity::Error => log::error!("{}", line),
        }
    }

    /// Routing decision emitted once per utterance.
    pub fn log_routing_decision(
        &self,
        decision_id: &str,
        strategy: &str,
        confidence: f32,
        reason: &str,
    ) {
        self.log_event(
            Severity::Info,
            "routing_decision",
            json!({
                "decision_id": decision_id,
                "strategy": strategy,
                "confidence": confidence,
                "reason": reason,
            }),
        );
    }

    /// Relay attempt state transition.
    pub fn log_relay_transition(&self, session_id: &str, state: &str, detail: Option<&str>) {
        self.log_event(
            Severity::Debug,
            "relay_transition",
            json!({
                "session_id": session_id,
                "state": state,
                "detail": detail,
            }),
        );
    }

    /// Voice session state transition.
    pub fn log_session_transition(&self, session_id: &str, from: &str, to: &str) {
        self.log_event(
            Severity::Info,
            "session_transition",
            json!({
                "session_id": session_id,
                "from": from,
                "to": to,
            }),
        );
    }

    /// A message or response discarded because its session is no longer current.
    pub fn log_stale_discard(&self, session_id: &str, kind: &str) {
        self.log_event(
            Severity::Debug,
            "stale_discarded",
            json!({
                "session_id": session_id,
                "kind": kind,
            }),
        );
    }

    /// Threshold adjustment applied by the strategy learner.
    pub fn log_learner_update(&self, strategy: &str, threshold: f32, succeeded: bool) {
        self.log_event(
            Severity::Debug,
            "threshold_updated",
            json!({
                "strategy": strategy,
                "threshold": threshold,
                "succeeded": succeeded,
            }),
        );
    }

    /// Best-effort persistence failure; never fatal.
    pub fn log_store_failure(&self, error: &str) {
        self.log_event(
            Severity::Warn,
            "learning_store_failed",
            json!({ "error": error }),
        );
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn iso8601_now() -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let secs = (now_ms / 1000) as i64;
    let nanos = ((now_ms % 1000) * 1_000_000) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| format!("{}.{:03}", secs, now_ms % 1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
        assert!(Severity::Info > Severity::Debug);
    }

    #[test]
    fn test_should_log_respects_global_level() {
        set_global_log_level(LogLevel::Warn);
        assert!(should_log(Severity::Error));
        assert!(should_log(Severity::Warn));
        assert!(!should_log(Severity::Info));

        set_global_log_level(LogLevel::Info);
        assert!(should_log(Severity::Info));
        assert!(!should_log(Severity::Debug));
    }

    #[test]
    fn test_disabled_telemetry_is_quiet() {
        // Emission path is a no-op; mainly checks it does not panic.
        let telemetry = Telemetry::with_enabled(false);
        telemetry.log_event(Severity::Error, "unit_test", json!({ "k": 1 }));
    }
}
