//! Routing engine - Decides where a classified utterance is executed.
//!
//! The engine merges the intent classification, a device-state snapshot, and
//! the current threshold table into a single strategy choice. It is
//! deterministic for identical inputs and has no side effects beyond decision
//! creation, so every decision path is unit-testable without a device.

use crate::config::RoutingConfig;
use crate::device::DeviceStateSnapshot;
use crate::intent::IntentClassification;
use crate::routing::learner::ThresholdSnapshot;
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Where a voice command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingStrategy {
    /// Deterministic local responder, free and instant.
    Offline,
    /// Local model inference on this device.
    OnDevice,
    /// Remote service execution.
    Server,
    /// On-device attempt with server completion, for mid-band confidence.
    Hybrid,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::Offline => "offline",
            RoutingStrategy::OnDevice => "on_device",
            RoutingStrategy::Server => "server",
            RoutingStrategy::Hybrid => "hybrid",
        }
    }

    /// All strategies, in tie-break preference order.
    pub fn preference_order() -> [RoutingStrategy; 4] {
        [
            RoutingStrategy::Offline,
            RoutingStrategy::OnDevice,
            RoutingStrategy::Hybrid,
            RoutingStrategy::Server,
        ]
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One routing decision. Immutable once emitted; corrections happen via new
/// decisions, never mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_id: Uuid,
    pub strategy: RoutingStrategy,
    pub confidence_at_decision: f32,
    pub snapshot: DeviceStateSnapshot,
    pub reason: String,
    /// True when nothing was eligible and the decision routes to the generic
    /// "cannot process" responder. A fallback, not a failure.
    pub is_fallback: bool,
    pub timestamp_ms: u64,
}

impl RoutingDecision {
    /// JSON form for telemetry sinks.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Which strategies the current inputs permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub offline: bool,
    pub on_device: bool,
    pub server: bool,
    pub hybrid: bool,
}

impl Eligibility {
    pub fn allows(&self, strategy: RoutingStrategy) -> bool {
        match strategy {
            RoutingStrategy::Offline => self.offline,
            RoutingStrategy::OnDevice => self.on_device,
            RoutingStrategy::Server => self.server,
            RoutingStrategy::Hybrid => self.hybrid,
        }
    }
}

/// Strategy selector. Holds only configuration; all mutable state lives in
/// the learner.
pub struct RoutingEngine {
    config: RoutingConfig,
    telemetry: Arc<Telemetry>,
}

impl RoutingEngine {
    pub fn new(config: RoutingConfig, telemetry: Arc<Telemetry>) -> Self {
        Self { config, telemetry }
    }

    /// Compute which strategies the inputs permit.
    ///
    /// - Offline: label is in the deterministic set, independent of confidence.
    /// - OnDevice: confidence clears its threshold and the tier is not Low.
    /// - Server: any network path exists.
    /// - Hybrid: OnDevice and Server both eligible and confidence sits in the
    ///   band around the on-device threshold (neither clearly high nor low).
    pub fn eligibility(
        &self,
        classification: &IntentClassification,
        snapshot: &DeviceStateSnapshot,
        thresholds: &ThresholdSnapshot,
    ) -> Eligibility {
        let on_device_threshold = thresholds.get(RoutingStrategy::OnDevice);
        let on_device = classification.confidence >= on_device_threshold
            && snapshot.performance_tier != crate::device::PerformanceTier::Low;
        let server = snapshot.has_network();
        let band = self.config.hybrid_band;
        let in_band = classification.confidence >= on_device_threshold - band
            && classification.confidence <= on_device_threshold + band;
        Eligibility {
            offline: classification.label.is_deterministic(),
            on_device,
            server,
            hybrid: on_device && server && in_band,
        }
    }

    /// Eligible strategies in tie-break preference order.
    pub fn eligible_strategies(
        &self,
        classification: &IntentClassification,
        snapshot: &DeviceStateSnapshot,
        thresholds: &ThresholdSnapshot,
    ) -> Vec<RoutingStrategy> {
        let eligibility = self.eligibility(classification, snapshot, thresholds);
        RoutingStrategy::preference_order()
            .into_iter()
            .filter(|strategy| eligibility.allows(*strategy))
            .collect()
    }

    /// Select a strategy for one classified utterance.
    ///
    /// Tie-break order: Offline (free and instant) → OnDevice when battery
    /// allows (privacy and cost win at adequate confidence) → Hybrid
    /// (accuracy/latency balance) → Server → terminal fallback decision
    /// routed to the generic "cannot process" responder.
    pub fn decide(
        &self,
        classification: &IntentClassification,
        snapshot: &DeviceStateSnapshot,
        thresholds: &ThresholdSnapshot,
    ) -> RoutingDecision {
        let eligibility = self.eligibility(classification, snapshot, thresholds);
        let on_device_threshold = thresholds.get(RoutingStrategy::OnDevice);

        let (strategy, reason, is_fallback) = if eligibility.offline {
            (
                RoutingStrategy::Offline,
                format!(
                    "deterministic_intent: '{}' has an offline responder",
                    classification.label
                ),
                false,
            )
        } else if eligibility.on_device
            && snapshot.battery_allows_local(self.config.low_battery_floor)
        {
            (
                RoutingStrategy::OnDevice,
                format!(
                    "adequate_confidence: {:.2} >= {:.2} with battery {:.0}%",
                    classification.confidence,
                    on_device_threshold,
                    snapshot.battery_level * 100.0
                ),
                false,
            )
        } else if eligibility.hybrid {
            (
                RoutingStrategy::Hybrid,
                format!(
                    "mid_band_confidence: {:.2} within ±{:.2} of {:.2}",
                    classification.confidence, self.config.hybrid_band, on_device_threshold
                ),
                false,
            )
        } else if eligibility.server {
            (
                RoutingStrategy::Server,
                format!(
                    "network_available: {} connectivity, confidence {:.2}",
                    snapshot.network_quality.as_str(),
                    classification.confidence
                ),
                false,
            )
        } else {
            (
                RoutingStrategy::Offline,
                format!(
                    "no_eligible_strategy: '{}' at {:.2} with {} network, routing to cannot-process responder",
                    classification.label,
                    classification.confidence,
                    snapshot.network_quality.as_str()
                ),
                true,
            )
        };

        let decision = RoutingDecision {
            decision_id: Uuid::new_v4(),
            strategy,
            confidence_at_decision: classification.confidence,
            snapshot: snapshot.clone(),
            reason,
            is_fallback,
            timestamp_ms: current_timestamp_ms(),
        };

        self.telemetry.log_routing_decision(
            &decision.decision_id.to_string(),
            decision.strategy.as_str(),
            decision.confidence_at_decision,
            &decision.reason,
        );

        decision
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{NetworkQuality, PerformanceTier};
    use crate::intent::IntentLabel;

    fn engine() -> RoutingEngine {
        RoutingEngine::new(
            RoutingConfig::default(),
            Arc::new(Telemetry::with_enabled(false)),
        )
    }

    fn snapshot(battery: f32, network: NetworkQuality, tier: PerformanceTier) -> DeviceStateSnapshot {
        DeviceStateSnapshot::new(battery, false, network, tier)
    }

    fn classification(label: IntentLabel, confidence: f32) -> IntentClassification {
        IntentClassification::new(label, confidence, "test utterance")
    }

    #[test]
    fn test_deterministic_intent_routes_offline() {
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::Time, 0.99),
            &snapshot(0.9, NetworkQuality::Good, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::Offline);
        assert!(!decision.is_fallback);
        assert!(decision.reason.contains("deterministic_intent"));
    }

    #[test]
    fn test_offline_wins_even_at_low_confidence() {
        // Offline eligibility is confidence-independent.
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::Greeting, 0.05),
            &snapshot(0.9, NetworkQuality::Good, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::Offline);
        assert!(!decision.is_fallback);
    }

    #[test]
    fn test_high_confidence_routes_on_device() {
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::EmailSummary, 0.95),
            &snapshot(0.8, NetworkQuality::Good, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::OnDevice);
        assert!(decision.reason.contains("adequate_confidence"));
    }

    #[test]
    fn test_low_battery_prefers_hybrid_in_band() {
        let engine = engine();
        let thresholds = ThresholdSnapshot::default();
        let on_device = thresholds.get(RoutingStrategy::OnDevice);
        let decision = engine.decide(
            &classification(IntentLabel::EmailSummary, on_device + 0.05),
            &snapshot(0.10, NetworkQuality::Good, PerformanceTier::High),
            &thresholds,
        );
        assert_eq!(decision.strategy, RoutingStrategy::Hybrid);
        assert!(decision.reason.contains("mid_band_confidence"));
    }

    #[test]
    fn test_low_confidence_with_network_routes_server() {
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::Weather, 0.40),
            &snapshot(0.8, NetworkQuality::Good, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::Server);
    }

    #[test]
    fn test_nothing_eligible_is_terminal_fallback_not_error() {
        // Scenario B: low confidence, no network, non-deterministic intent.
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::Weather, 0.40),
            &snapshot(0.8, NetworkQuality::None, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::Offline);
        assert!(decision.is_fallback);
        assert!(decision.reason.contains("no_eligible_strategy"));
    }

    #[test]
    fn test_low_performance_tier_blocks_on_device() {
        let engine = engine();
        let decision = engine.decide(
            &classification(IntentLabel::EmailSummary, 0.95),
            &snapshot(0.8, NetworkQuality::Good, PerformanceTier::Low),
            &ThresholdSnapshot::default(),
        );
        assert_eq!(decision.strategy, RoutingStrategy::Server);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let engine = engine();
        let classification = classification(IntentLabel::Calendar, 0.66);
        let snapshot = snapshot(0.5, NetworkQuality::Poor, PerformanceTier::Medium);
        let thresholds = ThresholdSnapshot::default();

        let first = engine.decide(&classification, &snapshot, &thresholds);
        for _ in 0..10 {
            let again = engine.decide(&classification, &snapshot, &thresholds);
            assert_eq!(first.strategy, again.strategy);
            assert_eq!(first.is_fallback, again.is_fallback);
        }
    }

    #[test]
    fn test_eligibility_monotonic_in_confidence() {
        // Raising confidence never demotes the decision to the fallback
        // Offline tier once a higher-trust tier was reachable.
        let engine = engine();
        let snapshot = snapshot(0.8, NetworkQuality::Good, PerformanceTier::High);
        let thresholds = ThresholdSnapshot::default();

        let mut previous_was_fallback = true;
        let mut confidence = 0.0;
        while confidence <= 1.0 {
            let decision = engine.decide(
                &classification(IntentLabel::GeneralQuery, confidence),
                &snapshot,
                &thresholds,
            );
            if !previous_was_fallback {
                assert!(
                    !decision.is_fallback,
                    "confidence {} regressed to fallback",
                    confidence
                );
            }
            previous_was_fallback = decision.is_fallback;
            confidence += 0.01;
        }
    }

    #[test]
    fn test_eligible_strategies_ordering() {
        let engine = engine();
        let strategies = engine.eligible_strategies(
            &classification(IntentLabel::Time, 0.99),
            &snapshot(0.8, NetworkQuality::Good, PerformanceTier::High),
            &ThresholdSnapshot::default(),
        );
        // Offline first, server last.
        assert_eq!(strategies.first(), Some(&RoutingStrategy::Offline));
        assert_eq!(strategies.last(), Some(&RoutingStrategy::Server));
    }

    #[test]
    fn test_threshold_boundary() {
        let engine = engine();
        let thresholds = ThresholdSnapshot::default();
        let at = thresholds.get(RoutingStrategy::OnDevice);
        let good = snapshot(0.8, NetworkQuality::Good, PerformanceTier::High);

        // Exactly at the threshold counts as eligible.
        let decision = engine.decide(
            &classification(IntentLabel::EmailSummary, at),
            &good,
            &thresholds,
        );
        assert_eq!(decision.strategy, RoutingStrategy::OnDevice);

        // Just below falls through.
        let decision = engine.decide(
            &classification(IntentLabel::EmailSummary, at - 0.01),
            &good,
            &thresholds,
        );
        assert_ne!(decision.strategy, RoutingStrategy::OnDevice);
    }
}
