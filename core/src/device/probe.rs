//! Device-state probing seam.
//!
//! Probing battery/network/performance is platform work that lives in the
//! host; the core only sees this trait. Keeping it injected makes routing
//! decisions reproducible in tests without any real device.

use super::types::{DeviceStateSnapshot, NetworkQuality, PerformanceTier};

/// Read-only device state provider, called once per routing decision.
pub trait DeviceStateProbe: Send + Sync {
    fn snapshot(&self) -> DeviceStateSnapshot;
}

/// Probe returning a fixed state; default for hosts that push state in from
/// outside, and the standard test double.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    pub battery_level: f32,
    pub is_charging: bool,
    pub network_quality: NetworkQuality,
    pub performance_tier: PerformanceTier,
}

impl StaticProbe {
    pub fn new(
        battery_level: f32,
        is_charging: bool,
        network_quality: NetworkQuality,
        performance_tier: PerformanceTier,
    ) -> Self {
        Self {
            battery_level,
            is_charging,
            network_quality,
            performance_tier,
        }
    }

    /// A healthy device: good battery, good network, high tier.
    pub fn healthy() -> Self {
        Self::new(0.8, false, NetworkQuality::Good, PerformanceTier::High)
    }

    /// A device with no connectivity.
    pub fn offline() -> Self {
        Self::new(0.8, false, NetworkQuality::None, PerformanceTier::High)
    }
}

impl DeviceStateProbe for StaticProbe {
    fn snapshot(&self) -> DeviceStateSnapshot {
        DeviceStateSnapshot::new(
            self.battery_level,
            self.is_charging,
            self.network_quality,
            self.performance_tier,
        )
    }
}
