//! Strategy learner - Adapts routing thresholds from observed outcomes.
//!
//! The learner runs on its own worker thread: `observe` posts to a channel
//! and returns immediately, so a slow or crashed learner can never stall a
//! live voice session. The worker is the single writer of [`LearningState`];
//! the routing path reads an immutable [`ThresholdSnapshot`] per decision and
//! never observes a half-updated table.

use crate::config::LearnerConfig;
use crate::error::{TandemError, TandemResult};
use crate::routing::engine::{RoutingDecision, RoutingStrategy};
use crate::routing::store::LearningStore;
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

/// Result of executing one routing decision. Exactly one per decision;
/// duplicates are idempotently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub decision_id: Uuid,
    pub succeeded: bool,
    pub latency_ms: u64,
    /// The strategy that was ultimately attempted when the decided one was
    /// abandoned, set whether or not that fallback succeeded.
    pub fell_back_to: Option<RoutingStrategy>,
}

/// Per-strategy threshold table plus smoothed success rates.
///
/// Only the thresholds and smoothed rates are persisted; the rolling window
/// and the dedup set are session-local reporting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningState {
    pub thresholds: HashMap<RoutingStrategy, f32>,
    pub success_ewma: HashMap<RoutingStrategy, f32>,
    #[serde(skip)]
    window: VecDeque<WindowRecord>,
    #[serde(skip)]
    recorded: HashSet<Uuid>,
    #[serde(skip)]
    recorded_order: VecDeque<Uuid>,
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    strategy: RoutingStrategy,
    succeeded: bool,
}

impl LearningState {
    /// Conservative startup defaults: a high bar for on-device inference,
    /// lower bars for the cheaper escape hatches.
    pub fn with_defaults() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(RoutingStrategy::Offline, 0.30);
        thresholds.insert(RoutingStrategy::OnDevice, 0.75);
        thresholds.insert(RoutingStrategy::Hybrid, 0.65);
        thresholds.insert(RoutingStrategy::Server, 0.50);
        Self {
            thresholds,
            success_ewma: HashMap::new(),
            window: VecDeque::new(),
            recorded: HashSet::new(),
            recorded_order: VecDeque::new(),
        }
    }

    pub fn threshold(&self, strategy: RoutingStrategy) -> f32 {
        self.thresholds.get(&strategy).copied().unwrap_or(0.75)
    }

    fn adjust(&mut self, strategy: RoutingStrategy, delta: f32, config: &LearnerConfig) {
        let current = self.threshold(strategy);
        let next = (current + delta).clamp(config.threshold_floor, config.threshold_ceiling);
        self.thresholds.insert(strategy, next);
    }
}

impl Default for LearningState {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Immutable per-decision view of the threshold table.
#[derive(Debug, Clone)]
pub struct ThresholdSnapshot {
    thresholds: HashMap<RoutingStrategy, f32>,
}

impl ThresholdSnapshot {
    pub fn get(&self, strategy: RoutingStrategy) -> f32 {
        self.thresholds.get(&strategy).copied().unwrap_or(0.75)
    }
}

impl Default for ThresholdSnapshot {
    fn default() -> Self {
        Self {
            thresholds: LearningState::with_defaults().thresholds,
        }
    }
}

impl From<&LearningState> for ThresholdSnapshot {
    fn from(state: &LearningState) -> Self {
        Self {
            thresholds: state.thresholds.clone(),
        }
    }
}

/// Per-strategy statistics for dashboards and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: RoutingStrategy,
    pub threshold: f32,
    pub window_attempts: u64,
    pub window_successes: u64,
    pub success_ewma: Option<f32>,
}

/// Snapshot of learner state for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerReport {
    pub strategies: Vec<StrategyReport>,
}

impl LearnerReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

enum LearnerCommand {
    Observe {
        decision: RoutingDecision,
        outcome: Outcome,
    },
    Shutdown,
}

/// Adaptive threshold learner. Construct once per process; cheap to share
/// handles through the orchestrator.
pub struct StrategyLearner {
    state: Arc<RwLock<LearningState>>,
    config: LearnerConfig,
    sender: Sender<LearnerCommand>,
    handle: Option<JoinHandle<()>>,
}

impl StrategyLearner {
    /// Load persisted state (or defaults) and spawn the learner worker.
    pub fn new(
        config: LearnerConfig,
        store: Arc<dyn LearningStore>,
        telemetry: Arc<Telemetry>,
    ) -> TandemResult<Self> {
        let initial = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => LearningState::with_defaults(),
            Err(err) => {
                // A corrupt or unreadable store must not block startup.
                telemetry.log_store_failure(&err.to_string());
                LearningState::with_defaults()
            }
        };

        let state = Arc::new(RwLock::new(initial));
        let (sender, receiver) = mpsc::channel();
        let worker = LearnerWorker {
            state: Arc::clone(&state),
            config: config.clone(),
            store,
            telemetry,
        };

        let handle = thread::Builder::new()
            .name("strategy-learner".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|err| TandemError::Worker(err.to_string()))?;

        Ok(Self {
            state,
            config,
            sender,
            handle: Some(handle),
        })
    }

    /// Current thresholds as an immutable snapshot.
    pub fn thresholds(&self) -> ThresholdSnapshot {
        match self.state.read() {
            Ok(state) => ThresholdSnapshot::from(&*state),
            Err(_) => ThresholdSnapshot::default(),
        }
    }

    /// Record an outcome. Fire-and-forget: never blocks and never fails the
    /// routing path; a dead worker just drops the observation.
    pub fn observe(&self, decision: &RoutingDecision, outcome: Outcome) {
        let _ = self.sender.send(LearnerCommand::Observe {
            decision: decision.clone(),
            outcome,
        });
    }

    /// Per-strategy success statistics for reporting.
    pub fn report(&self) -> LearnerReport {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(_) => return LearnerReport { strategies: vec![] },
        };
        let strategies = RoutingStrategy::preference_order()
            .into_iter()
            .map(|strategy| {
                let attempts = state
                    .window
                    .iter()
                    .filter(|r| r.strategy == strategy)
                    .count() as u64;
                let successes = state
                    .window
                    .iter()
                    .filter(|r| r.strategy == strategy && r.succeeded)
                    .count() as u64;
                StrategyReport {
                    strategy,
                    threshold: state.threshold(strategy),
                    window_attempts: attempts,
                    window_successes: successes,
                    success_ewma: state.success_ewma.get(&strategy).copied(),
                }
            })
            .collect();
        LearnerReport { strategies }
    }

    /// Configured clamp bounds, exposed for diagnostics.
    pub fn bounds(&self) -> (f32, f32) {
        (self.config.threshold_floor, self.config.threshold_ceiling)
    }

    /// Drain the worker and join it.
    pub fn shutdown(mut self) -> TandemResult<()> {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(LearnerCommand::Shutdown);
            handle
                .join()
                .map_err(|_| TandemError::Worker("learner worker panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StrategyLearner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(LearnerCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

struct LearnerWorker {
    state: Arc<RwLock<LearningState>>,
    config: LearnerConfig,
    store: Arc<dyn LearningStore>,
    telemetry: Arc<Telemetry>,
}

impl LearnerWorker {
    fn run(self, receiver: Receiver<LearnerCommand>) {
        while let Ok(command) = receiver.recv() {
            match command {
                LearnerCommand::Observe { decision, outcome } => {
                    self.apply(&decision, &outcome);
                }
                LearnerCommand::Shutdown => break,
            }
        }
    }

    fn apply(&self, decision: &RoutingDecision, outcome: &Outcome) {
        let snapshot_for_save;
        {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(_) => return,
            };

            // Out-of-order or duplicate outcomes for a decision are no-ops.
            if state.recorded.contains(&outcome.decision_id) {
                self.telemetry.log_event(
                    crate::telemetry::Severity::Debug,
                    "duplicate_outcome_ignored",
                    serde_json::json!({ "decision_id": outcome.decision_id.to_string() }),
                );
                return;
            }
            state.recorded.insert(outcome.decision_id);
            state.recorded_order.push_back(outcome.decision_id);
            while state.recorded_order.len() > RECORDED_ID_CAP {
                if let Some(old) = state.recorded_order.pop_front() {
                    state.recorded.remove(&old);
                }
            }

            let decided = decision.strategy;
            match outcome.fell_back_to {
                Some(fallback) => {
                    // Punish the abandoned strategy harder than an ordinary
                    // failure; the fallback gets the normal nudge for its
                    // own result.
                    state.adjust(decided, self.config.abandoned_step, &self.config);
                    if outcome.succeeded {
                        state.adjust(fallback, -self.config.success_step, &self.config);
                    } else {
                        state.adjust(fallback, self.config.failure_step, &self.config);
                    }
                }
                None => {
                    if outcome.succeeded {
                        state.adjust(decided, -self.config.success_step, &self.config);
                    } else {
                        state.adjust(decided, self.config.failure_step, &self.config);
                    }
                }
            }

            // The window records the strategy that ultimately ran.
            let executed = outcome.fell_back_to.unwrap_or(decided);
            state.window.push_back(WindowRecord {
                strategy: executed,
                succeeded: outcome.succeeded,
            });
            while state.window.len() > self.config.window_size {
                state.window.pop_front();
            }

            let alpha = self.config.ewma_alpha;
            let sample = if outcome.succeeded { 1.0 } else { 0.0 };
            let ewma = match state.success_ewma.get(&executed) {
                Some(previous) => alpha * sample + (1.0 - alpha) * previous,
                None => sample,
            };
            state.success_ewma.insert(executed, ewma);

            self.telemetry.log_learner_update(
                decided.as_str(),
                state.threshold(decided),
                outcome.succeeded,
            );

            snapshot_for_save = state.clone();
        }

        // Persistence is opportunistic; failures never propagate.
        if let Err(err) = self.store.save(&snapshot_for_save) {
            self.telemetry.log_store_failure(&err.to_string());
        }
    }
}

const RECORDED_ID_CAP: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearnerConfig;
    use crate::device::{DeviceStateSnapshot, NetworkQuality, PerformanceTier};
    use crate::routing::store::MemoryStore;
    use std::time::Duration;

    fn decision(strategy: RoutingStrategy) -> RoutingDecision {
        RoutingDecision {
            decision_id: Uuid::new_v4(),
            strategy,
            confidence_at_decision: 0.8,
            snapshot: DeviceStateSnapshot::new(
                0.8,
                false,
                NetworkQuality::Good,
                PerformanceTier::High,
            ),
            reason: "test".to_string(),
            is_fallback: false,
            timestamp_ms: 0,
        }
    }

    fn outcome(decision: &RoutingDecision, succeeded: bool) -> Outcome {
        Outcome {
            decision_id: decision.decision_id,
            succeeded,
            latency_ms: 100,
            fell_back_to: None,
        }
    }

    fn learner() -> StrategyLearner {
        StrategyLearner::new(
            LearnerConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("spawn learner")
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_success_lowers_threshold_toward_floor() {
        let learner = learner();
        let initial = learner.thresholds().get(RoutingStrategy::OnDevice);

        for _ in 0..200 {
            let d = decision(RoutingStrategy::OnDevice);
            learner.observe(&d, outcome(&d, true));
        }
        wait_for(|| {
            let current = learner.thresholds().get(RoutingStrategy::OnDevice);
            (current - 0.30).abs() < 1e-4
        });
        let final_threshold = learner.thresholds().get(RoutingStrategy::OnDevice);
        assert!(final_threshold < initial);
        assert!(final_threshold >= 0.30);
    }

    #[test]
    fn test_failure_raises_threshold_toward_ceiling() {
        let learner = learner();
        for _ in 0..200 {
            let d = decision(RoutingStrategy::Server);
            learner.observe(&d, outcome(&d, false));
        }
        wait_for(|| {
            let current = learner.thresholds().get(RoutingStrategy::Server);
            (current - 0.95).abs() < 1e-4
        });
    }

    #[test]
    fn test_thresholds_never_leave_bounds() {
        let learner = learner();
        for _ in 0..500 {
            let d = decision(RoutingStrategy::OnDevice);
            learner.observe(&d, outcome(&d, true));
            let d = decision(RoutingStrategy::Server);
            learner.observe(&d, outcome(&d, false));
        }
        wait_for(|| {
            let report = learner.report();
            report
                .strategies
                .iter()
                .any(|s| s.window_attempts > 0)
        });
        let thresholds = learner.thresholds();
        for strategy in RoutingStrategy::preference_order() {
            let value = thresholds.get(strategy);
            assert!((0.30..=0.95).contains(&value), "{} = {}", strategy, value);
        }
    }

    #[test]
    fn test_abandoned_strategy_punished_harder() {
        let learner = learner();
        let initial = learner.thresholds();
        let initial_hybrid = initial.get(RoutingStrategy::Hybrid);
        let initial_server = initial.get(RoutingStrategy::Server);

        let d = decision(RoutingStrategy::Hybrid);
        learner.observe(
            &d,
            Outcome {
                decision_id: d.decision_id,
                succeeded: true,
                latency_ms: 900,
                fell_back_to: Some(RoutingStrategy::Server),
            },
        );
        wait_for(|| {
            learner.thresholds().get(RoutingStrategy::Hybrid) > initial_hybrid
        });

        let after = learner.thresholds();
        // Abandoned strategy raised by the aggressive step...
        assert!(after.get(RoutingStrategy::Hybrid) - initial_hybrid > 0.04);
        // ...while the strategy that actually delivered got a success nudge.
        assert!(after.get(RoutingStrategy::Server) < initial_server);
    }

    #[test]
    fn test_duplicate_outcomes_are_ignored() {
        let learner = learner();
        let d = decision(RoutingStrategy::OnDevice);
        let o = outcome(&d, true);
        learner.observe(&d, o.clone());
        learner.observe(&d, o.clone());
        learner.observe(&d, o);

        wait_for(|| {
            learner
                .report()
                .strategies
                .iter()
                .find(|s| s.strategy == RoutingStrategy::OnDevice)
                .map(|s| s.window_attempts == 1)
                .unwrap_or(false)
        });
        let threshold = learner.thresholds().get(RoutingStrategy::OnDevice);
        // One success step, not three.
        assert!((threshold - 0.74).abs() < 1e-4);
    }

    #[test]
    fn test_report_counts_window_outcomes() {
        let learner = learner();
        for i in 0..10 {
            let d = decision(RoutingStrategy::Server);
            learner.observe(&d, outcome(&d, i % 2 == 0));
        }
        wait_for(|| {
            learner
                .report()
                .strategies
                .iter()
                .find(|s| s.strategy == RoutingStrategy::Server)
                .map(|s| s.window_attempts == 10)
                .unwrap_or(false)
        });
        let report = learner.report();
        let server = report
            .strategies
            .iter()
            .find(|s| s.strategy == RoutingStrategy::Server)
            .unwrap();
        assert_eq!(server.window_successes, 5);
        assert!(server.success_ewma.is_some());
    }

    #[test]
    fn test_learner_persists_after_updates() {
        let store = Arc::new(MemoryStore::new());
        let learner = StrategyLearner::new(
            LearnerConfig::default(),
            store.clone(),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("spawn learner");

        let d = decision(RoutingStrategy::OnDevice);
        learner.observe(&d, outcome(&d, true));
        wait_for(|| store.load().unwrap().is_some());

        let persisted = store.load().unwrap().unwrap();
        assert!(persisted.threshold(RoutingStrategy::OnDevice) < 0.75);
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let learner = learner();
        learner.shutdown().expect("clean shutdown");
    }
}
