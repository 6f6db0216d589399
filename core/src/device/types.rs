//! Device-state types consumed by the routing engine.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Coarse network classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkQuality {
    /// No usable connectivity.
    None,
    /// Reachable but degraded (high latency or packet loss).
    Poor,
    /// Healthy connectivity.
    Good,
}

impl NetworkQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::None => "none",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Good => "good",
        }
    }
}

/// Coarse performance tier of the device.
///
/// Low-tier devices (older companions, constrained wearables) are excluded
/// from on-device model execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceTier {
    Low,
    Medium,
    High,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Low => "low",
            PerformanceTier::Medium => "medium",
            PerformanceTier::High => "high",
        }
    }
}

/// Point-in-time device state. Recomputed per routing decision; never
/// persisted beyond the decision that used it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateSnapshot {
    /// Battery fraction in [0, 1].
    pub battery_level: f32,
    pub is_charging: bool,
    pub network_quality: NetworkQuality,
    pub performance_tier: PerformanceTier,
    pub timestamp_ms: u64,
}

impl DeviceStateSnapshot {
    pub fn new(
        battery_level: f32,
        is_charging: bool,
        network_quality: NetworkQuality,
        performance_tier: PerformanceTier,
    ) -> Self {
        Self {
            battery_level: battery_level.clamp(0.0, 1.0),
            is_charging,
            network_quality,
            performance_tier,
            timestamp_ms: current_timestamp_ms(),
        }
    }

    /// Whether any network path exists (Poor still counts).
    pub fn has_network(&self) -> bool {
        self.network_quality != NetworkQuality::None
    }

    /// Whether local compute is affordable: not running on fumes unless
    /// plugged in.
    pub fn battery_allows_local(&self, floor: f32) -> bool {
        self.is_charging || self.battery_level > floor
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
