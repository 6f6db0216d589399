//! Device module - Device-state snapshots consumed by routing decisions.
//!
//! A snapshot is a pure, point-in-time read of battery, network class, and a
//! coarse performance tier. It is recomputed for every routing decision and
//! never persisted beyond the decision that used it. Probing is an injected
//! collaborator so routing stays deterministic under test.

pub mod probe;
pub mod types;

pub use probe::{DeviceStateProbe, StaticProbe};
pub use types::{DeviceStateSnapshot, NetworkQuality, PerformanceTier};
