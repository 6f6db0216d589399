//! Configuration for the voice routing core.
//!
//! All sections carry `Default` impls with the shipped constants, so hosts can
//! construct a [`CoreConfig`] with `Default::default()` and override fields,
//! or load one from YAML or JSON bytes.

use crate::error::{TandemError, TandemResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Routing engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Half-width of the confidence band around the on-device threshold in
    /// which Hybrid becomes eligible.
    pub hybrid_band: f32,
    /// Below this battery fraction (and not charging), on-device execution is
    /// deprioritized in favor of Hybrid/Server.
    pub low_battery_floor: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            hybrid_band: 0.15,
            low_battery_floor: 0.15,
        }
    }
}

/// Strategy learner tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Threshold decrease applied after a success.
    pub success_step: f32,
    /// Threshold increase applied after a failure.
    pub failure_step: f32,
    /// Threshold increase applied to a strategy that was abandoned for a
    /// fallback. Deliberately larger than `failure_step`.
    pub abandoned_step: f32,
    /// Lower clamp for every threshold.
    pub threshold_floor: f32,
    /// Upper clamp for every threshold.
    pub threshold_ceiling: f32,
    /// Number of recent outcomes retained for success-rate reporting.
    pub window_size: usize,
    /// Smoothing factor for the exponentially-weighted success rate.
    pub ewma_alpha: f32,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            success_step: 0.01,
            failure_step: 0.02,
            abandoned_step: 0.05,
            threshold_floor: 0.30,
            threshold_ceiling: 0.95,
            window_size: 200,
            ewma_alpha: 0.1,
        }
    }
}

/// Companion relay protocol timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Milliseconds to wait for the transport-level `Ack`.
    pub ack_timeout_ms: u64,
    /// Milliseconds to wait for the final `Response` after the `Ack`.
    pub response_timeout_ms: u64,
}

impl RelayConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            response_timeout_ms: 15_000,
        }
    }
}

/// Voice session lifecycle timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum capture duration. Stops before this point are deferred, not
    /// dropped.
    pub min_capture_ms: u64,
    /// Per-strategy execution budget for on-device inference.
    pub on_device_timeout_ms: u64,
    /// Per-strategy execution budget for Server and Hybrid execution.
    pub server_timeout_ms: u64,
    /// How long a delivered response or error is held before the session is
    /// considered auto-dismissable.
    pub response_hold_ms: u64,
}

impl SessionConfig {
    pub fn min_capture(&self) -> Duration {
        Duration::from_millis(self.min_capture_ms)
    }

    pub fn on_device_timeout(&self) -> Duration {
        Duration::from_millis(self.on_device_timeout_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_millis(self.server_timeout_ms)
    }

    pub fn response_hold(&self) -> Duration {
        Duration::from_millis(self.response_hold_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_capture_ms: 500,
            on_device_timeout_ms: 3_000,
            server_timeout_ms: 10_000,
            response_hold_ms: 4_000,
        }
    }
}

/// Aggregate configuration for the voice routing core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub routing: RoutingConfig,
    pub learner: LearnerConfig,
    pub relay: RelayConfig,
    pub session: SessionConfig,
}

impl CoreConfig {
    /// Parse a configuration document, trying YAML first and JSON second.
    pub fn from_bytes(bytes: &[u8]) -> TandemResult<Self> {
        if let Ok(config) = serde_yaml::from_slice::<CoreConfig>(bytes) {
            return Ok(config);
        }
        serde_json::from_slice::<CoreConfig>(bytes)
            .map_err(|err| TandemError::Config(format!("not valid YAML or JSON: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipped_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.relay.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.relay.response_timeout(), Duration::from_secs(15));
        assert_eq!(config.session.min_capture(), Duration::from_millis(500));
        assert_eq!(config.session.on_device_timeout(), Duration::from_secs(3));
        assert_eq!(config.session.server_timeout(), Duration::from_secs(10));
        assert!((config.routing.hybrid_band - 0.15).abs() < f32::EPSILON);
        assert!((config.learner.threshold_floor - 0.30).abs() < f32::EPSILON);
        assert!((config.learner.threshold_ceiling - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml = r#"
relay:
  ack_timeout_ms: 2000
session:
  min_capture_ms: 250
"#;
        let config = CoreConfig::from_bytes(yaml.as_bytes()).expect("yaml config");
        assert_eq!(config.relay.ack_timeout_ms, 2000);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.relay.response_timeout_ms, 15_000);
        assert_eq!(config.session.min_capture_ms, 250);
    }

    #[test]
    fn test_load_json_config() {
        let json = r#"{ "learner": { "success_step": 0.05 } }"#;
        let config = CoreConfig::from_bytes(json.as_bytes()).expect("json config");
        assert!((config.learner.success_step - 0.05).abs() < f32::EPSILON);
        assert!((config.learner.failure_step - 0.02).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        // serde_yaml accepts most scalars, so use a structurally wrong doc.
        let bad = b"relay: [1, 2, 3]";
        assert!(CoreConfig::from_bytes(bad).is_err());
    }
}
