//! Orchestrator - Coordinates one utterance from classification to response.
//!
//! The orchestrator is the highest-level layer of the core. Per utterance it:
//!
//! 1. Classifies the text (a failed classifier degrades to `{Unknown, 0.0}`)
//! 2. Takes a device-state snapshot and a threshold snapshot
//! 3. Asks the routing engine for a decision
//! 4. Executes the decision, walking the eligible-strategy chain on
//!    recoverable failures
//! 5. Reports exactly one [`Outcome`] per decision to the strategy learner
//!
//! On a companion device the orchestrator first offers non-offline work to
//! the primary over the relay; a relay that is unreachable or times out
//! degrades into direct execution on this device. Every path terminates in a
//! response or a typed error within the configured budgets.

use crate::config::CoreConfig;
use crate::device::DeviceStateProbe;
use crate::error::{TandemError, TandemResult};
use crate::execution::{
    run_with_timeout, ExecutionError, ExecutionResponse, OnDeviceModel, RemoteExecutor,
};
use crate::intent::{IntentClassification, IntentSource};
use crate::offline::OfflineHandlerRegistry;
use crate::relay::{CompanionRelay, RelayError};
use crate::routing::{
    LearnerReport, LearningStore, MemoryStore, Outcome, RoutingDecision, RoutingEngine,
    RoutingStrategy, StrategyLearner, ThresholdSnapshot,
};
use crate::telemetry::{Severity, Telemetry};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Which half of the device pair this orchestrator runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// The better-resourced device; processes locally and serves the relay.
    Primary,
    /// The constrained device; prefers handing non-offline work to the
    /// primary over the relay.
    Companion,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Primary => "primary",
            DeviceRole::Companion => "companion",
        }
    }
}

/// A finished capture, ready for routing.
#[derive(Debug, Clone)]
pub struct CapturedUtterance {
    pub session_id: Uuid,
    /// Transcribed text of the utterance.
    pub text: String,
    /// Raw audio, carried for relay handoff.
    pub audio: Vec<u8>,
    pub captured_at_ms: u64,
}

/// The answer delivered to the session layer.
#[derive(Debug, Clone)]
pub struct VoiceResponse {
    pub text: String,
    pub audio: Option<Vec<u8>>,
    /// The strategy that actually produced this response.
    pub strategy: RoutingStrategy,
    pub decision_id: Uuid,
    pub latency_ms: u64,
}

/// Top-level coordinator for one device.
pub struct Orchestrator {
    config: CoreConfig,
    role: DeviceRole,
    engine: RoutingEngine,
    learner: StrategyLearner,
    offline: OfflineHandlerRegistry,
    intent_source: Arc<dyn IntentSource>,
    probe: Arc<dyn DeviceStateProbe>,
    remote: Option<Arc<dyn RemoteExecutor>>,
    local_model: Option<Arc<dyn OnDeviceModel>>,
    relay: Option<Arc<CompanionRelay>>,
    telemetry: Arc<Telemetry>,
}

impl Orchestrator {
    /// Create an orchestrator with in-memory learning state and default
    /// telemetry. Backends are attached with the `with_*` builders.
    pub fn new(
        config: CoreConfig,
        role: DeviceRole,
        intent_source: Arc<dyn IntentSource>,
        probe: Arc<dyn DeviceStateProbe>,
    ) -> TandemResult<Self> {
        Self::with_store(
            config,
            role,
            intent_source,
            probe,
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::new()),
        )
    }

    /// Create an orchestrator with explicit learning persistence and
    /// telemetry.
    pub fn with_store(
        config: CoreConfig,
        role: DeviceRole,
        intent_source: Arc<dyn IntentSource>,
        probe: Arc<dyn DeviceStateProbe>,
        store: Arc<dyn LearningStore>,
        telemetry: Arc<Telemetry>,
    ) -> TandemResult<Self> {
        let engine = RoutingEngine::new(config.routing.clone(), Arc::clone(&telemetry));
        let learner = StrategyLearner::new(config.learner.clone(), store, Arc::clone(&telemetry))?;
        let offline = OfflineHandlerRegistry::with_defaults(Arc::clone(&probe));
        Ok(Self {
            config,
            role,
            engine,
            learner,
            offline,
            intent_source,
            probe,
            remote: None,
            local_model: None,
            relay: None,
            telemetry,
        })
    }

    /// Attach the remote service backend for the Server strategy.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Attach the local inference backend for the OnDevice strategy.
    pub fn with_local_model(mut self, model: Arc<dyn OnDeviceModel>) -> Self {
        self.local_model = Some(model);
        self
    }

    /// Attach the device-pair relay.
    pub fn with_relay(mut self, relay: Arc<CompanionRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Replace the offline handler registry.
    pub fn with_offline_registry(mut self, offline: OfflineHandlerRegistry) -> Self {
        self.offline = offline;
        self
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Current adaptive thresholds, for diagnostics.
    pub fn thresholds(&self) -> ThresholdSnapshot {
        self.learner.thresholds()
    }

    /// Per-strategy learner statistics, for diagnostics.
    pub fn learner_report(&self) -> LearnerReport {
        self.learner.report()
    }

    /// Route and execute one captured utterance.
    pub fn handle_utterance(&self, utterance: &CapturedUtterance) -> TandemResult<VoiceResponse> {
        let started = Instant::now();

        let classification = match self.intent_source.classify(&utterance.text) {
            Ok(classification) => classification,
            Err(err) => {
                let failure = TandemError::ClassificationUnavailable(err.to_string());
                self.telemetry.log_event(
                    Severity::Warn,
                    "classification_failed",
                    json!({
                        "session_id": utterance.session_id.to_string(),
                        "error": failure.to_string(),
                    }),
                );
                IntentClassification::unknown(&utterance.text)
            }
        };

        let snapshot = self.probe.snapshot();
        let thresholds = self.learner.thresholds();
        let decision = self.engine.decide(&classification, &snapshot, &thresholds);

        // Nothing eligible: answer with the terminal responder. A delivered
        // fallback, not a failure.
        if decision.is_fallback {
            let text = self.offline.fallback_response().text;
            let latency_ms = started.elapsed().as_millis() as u64;
            self.learner.observe(
                &decision,
                Outcome {
                    decision_id: decision.decision_id,
                    succeeded: true,
                    latency_ms,
                    fell_back_to: None,
                },
            );
            return Ok(VoiceResponse {
                text,
                audio: None,
                strategy: RoutingStrategy::Offline,
                decision_id: decision.decision_id,
                latency_ms,
            });
        }

        // Companion devices offer non-offline work to the primary first.
        let mut relay_fell_back = false;
        if self.role == DeviceRole::Companion && decision.strategy != RoutingStrategy::Offline {
            if let Some(relay) = &self.relay {
                match relay.relay_utterance(
                    utterance.session_id,
                    utterance.audio.clone(),
                    utterance.captured_at_ms,
                ) {
                    Ok(relayed) => {
                        let latency_ms = started.elapsed().as_millis() as u64;
                        self.learner.observe(
                            &decision,
                            Outcome {
                                decision_id: decision.decision_id,
                                succeeded: relayed.success,
                                latency_ms,
                                fell_back_to: None,
                            },
                        );
                        return Ok(VoiceResponse {
                            text: relayed.text,
                            audio: relayed.audio,
                            strategy: decision.strategy,
                            decision_id: decision.decision_id,
                            latency_ms,
                        });
                    }
                    Err(RelayError::Superseded) => {
                        return Err(TandemError::StaleSession(utterance.session_id));
                    }
                    Err(err) => {
                        // Relay unavailable degrades to direct execution.
                        self.telemetry.log_event(
                            Severity::Info,
                            "relay_unavailable",
                            json!({
                                "session_id": utterance.session_id.to_string(),
                                "error": err.to_string(),
                            }),
                        );
                        relay_fell_back = true;
                    }
                }
            }
        }

        self.execute_chain(
            &classification,
            &decision,
            &thresholds,
            started,
            relay_fell_back,
        )
    }

    /// Walk the decided strategy plus the remaining eligible strategies in
    /// preference order until one delivers or a terminal error stops the
    /// chain.
    fn execute_chain(
        &self,
        classification: &IntentClassification,
        decision: &RoutingDecision,
        thresholds: &ThresholdSnapshot,
        started: Instant,
        relay_fell_back: bool,
    ) -> TandemResult<VoiceResponse> {
        let mut chain = vec![decision.strategy];
        for strategy in
            self.engine
                .eligible_strategies(classification, &decision.snapshot, thresholds)
        {
            if !chain.contains(&strategy) {
                chain.push(strategy);
            }
        }

        let mut last_error: Option<ExecutionError> = None;
        for (index, strategy) in chain.iter().copied().enumerate() {
            let fell_back = relay_fell_back || index > 0;
            match self.execute_strategy(strategy, classification) {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.learner.observe(
                        decision,
                        Outcome {
                            decision_id: decision.decision_id,
                            succeeded: true,
                            latency_ms,
                            fell_back_to: fell_back.then_some(strategy),
                        },
                    );
                    return Ok(VoiceResponse {
                        text: response.text,
                        audio: response.audio,
                        strategy,
                        decision_id: decision.decision_id,
                        latency_ms,
                    });
                }
                Err(err) => {
                    self.telemetry.log_event(
                        Severity::Warn,
                        "strategy_failed",
                        json!({
                            "decision_id": decision.decision_id.to_string(),
                            "strategy": strategy.as_str(),
                            "error": err.to_string(),
                            "terminal": err.is_terminal(),
                        }),
                    );
                    if err.is_terminal() {
                        let latency_ms = started.elapsed().as_millis() as u64;
                        self.learner.observe(
                            decision,
                            Outcome {
                                decision_id: decision.decision_id,
                                succeeded: false,
                                latency_ms,
                                fell_back_to: fell_back.then_some(strategy),
                            },
                        );
                        return Err(err.to_core_error());
                    }
                    last_error = Some(err);
                }
            }
        }

        // Every eligible strategy failed.
        let latency_ms = started.elapsed().as_millis() as u64;
        let final_strategy = chain.last().copied().unwrap_or(decision.strategy);
        let fell_back = relay_fell_back || chain.len() > 1;
        self.learner.observe(
            decision,
            Outcome {
                decision_id: decision.decision_id,
                succeeded: false,
                latency_ms,
                fell_back_to: fell_back.then_some(final_strategy),
            },
        );
        Err(last_error
            .map(|err| err.to_core_error())
            .unwrap_or(TandemError::NoEligibleStrategy))
    }

    fn execute_strategy(
        &self,
        strategy: RoutingStrategy,
        classification: &IntentClassification,
    ) -> Result<ExecutionResponse, ExecutionError> {
        match strategy {
            RoutingStrategy::Offline => {
                // A handler that cannot answer makes Offline ineligible after
                // the fact; the chain escalates.
                match self
                    .offline
                    .handle(classification.label, &classification.raw_text)
                {
                    Ok(response) => Ok(ExecutionResponse::text_only(response.text)),
                    Err(err) => Err(ExecutionError::Model(err.to_string())),
                }
            }
            RoutingStrategy::OnDevice => {
                let model = self
                    .local_model
                    .clone()
                    .ok_or_else(|| ExecutionError::Model("no on-device model attached".to_string()))?;
                let label = classification.label;
                let text = classification.raw_text.clone();
                run_with_timeout(self.config.session.on_device_timeout(), move || {
                    model.infer(label, &text)
                })
            }
            RoutingStrategy::Server => {
                let remote = self.remote.clone().ok_or_else(|| {
                    ExecutionError::Network("no remote executor attached".to_string())
                })?;
                let label = classification.label;
                let text = classification.raw_text.clone();
                run_with_timeout(self.config.session.server_timeout(), move || {
                    remote.execute(label, &text)
                })
            }
            RoutingStrategy::Hybrid => self.execute_hybrid(classification),
        }
    }

    /// Hybrid: produce an on-device draft inside its budget, then let the
    /// server refine it. The server answer wins; if the server fails, the
    /// local draft substitutes. Fails only when both halves fail.
    fn execute_hybrid(
        &self,
        classification: &IntentClassification,
    ) -> Result<ExecutionResponse, ExecutionError> {
        let label = classification.label;

        let draft = self.local_model.clone().and_then(|model| {
            let text = classification.raw_text.clone();
            run_with_timeout(self.config.session.on_device_timeout(), move || {
                model.infer(label, &text)
            })
            .ok()
        });

        let remote = self.remote.clone().ok_or_else(|| {
            ExecutionError::Network("no remote executor attached".to_string())
        });
        let server_result = remote.and_then(|remote| {
            let text = classification.raw_text.clone();
            run_with_timeout(self.config.session.server_timeout(), move || {
                remote.execute(label, &text)
            })
        });

        match server_result {
            Ok(response) => Ok(response),
            Err(err) => draft.ok_or(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticProbe;
    use crate::intent::KeywordIntentSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRemote {
        calls: AtomicUsize,
        result: fn() -> Result<ExecutionResponse, ExecutionError>,
    }

    impl FixedRemote {
        fn new(result: fn() -> Result<ExecutionResponse, ExecutionError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
            }
        }
    }

    impl RemoteExecutor for FixedRemote {
        fn execute(
            &self,
            _label: crate::intent::IntentLabel,
            _text: &str,
        ) -> Result<ExecutionResponse, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct FixedModel {
        result: fn() -> Result<ExecutionResponse, ExecutionError>,
    }

    impl OnDeviceModel for FixedModel {
        fn infer(
            &self,
            _label: crate::intent::IntentLabel,
            _text: &str,
        ) -> Result<ExecutionResponse, ExecutionError> {
            (self.result)()
        }
    }

    fn orchestrator(probe: StaticProbe) -> Orchestrator {
        Orchestrator::with_store(
            CoreConfig::default(),
            DeviceRole::Primary,
            Arc::new(KeywordIntentSource::new()),
            Arc::new(probe),
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("orchestrator")
    }

    fn utterance(text: &str) -> CapturedUtterance {
        CapturedUtterance {
            session_id: Uuid::new_v4(),
            text: text.to_string(),
            audio: vec![0u8; 8],
            captured_at_ms: 0,
        }
    }

    struct BrokenSource;

    impl crate::intent::IntentSource for BrokenSource {
        fn classify(&self, _text: &str) -> anyhow::Result<IntentClassification> {
            anyhow::bail!("classifier backend unavailable")
        }
    }

    #[test]
    fn test_classifier_failure_degrades_to_unknown() {
        // A dead classifier yields {Unknown, 0.0}; with no network that
        // leaves nothing eligible, so even a deterministic-sounding command
        // settles in the cannot-process responder instead of erroring.
        let orchestrator = Orchestrator::with_store(
            CoreConfig::default(),
            DeviceRole::Primary,
            Arc::new(BrokenSource),
            Arc::new(StaticProbe::offline()),
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("orchestrator");

        let response = orchestrator
            .handle_utterance(&utterance("what time is it"))
            .expect("degraded classification still delivers a response");
        assert_eq!(response.strategy, RoutingStrategy::Offline);
        assert!(response.text.contains("can't help"));
    }

    #[test]
    fn test_classifier_failure_with_network_routes_server() {
        let remote = Arc::new(FixedRemote::new(|| {
            Ok(ExecutionResponse::text_only("server handled it"))
        }));
        let orchestrator = Orchestrator::with_store(
            CoreConfig::default(),
            DeviceRole::Primary,
            Arc::new(BrokenSource),
            Arc::new(StaticProbe::healthy()),
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("orchestrator")
        .with_remote(remote);

        let response = orchestrator
            .handle_utterance(&utterance("what time is it"))
            .expect("server answer");
        assert_eq!(response.strategy, RoutingStrategy::Server);
        assert_eq!(response.text, "server handled it");
    }

    #[test]
    fn test_deterministic_intent_answered_offline() {
        let orchestrator = orchestrator(StaticProbe::healthy());
        let response = orchestrator
            .handle_utterance(&utterance("what is 12 plus 5"))
            .expect("offline answer");
        assert_eq!(response.strategy, RoutingStrategy::Offline);
        assert_eq!(response.text, "That's 17.");
    }

    #[test]
    fn test_nothing_eligible_delivers_cannot_process() {
        // Non-deterministic low-confidence intent, no network.
        let orchestrator = orchestrator(StaticProbe::offline());
        let response = orchestrator
            .handle_utterance(&utterance("tell me a story about whales"))
            .expect("fallback answer");
        assert_eq!(response.strategy, RoutingStrategy::Offline);
        assert!(response.text.contains("can't help"));
    }

    #[test]
    fn test_low_confidence_with_network_uses_server() {
        let remote = Arc::new(FixedRemote::new(|| {
            Ok(ExecutionResponse::text_only("from the server"))
        }));
        let orchestrator =
            orchestrator(StaticProbe::healthy()).with_remote(remote.clone());
        let response = orchestrator
            .handle_utterance(&utterance("tell me a story about whales"))
            .expect("server answer");
        assert_eq!(response.strategy, RoutingStrategy::Server);
        assert_eq!(response.text, "from the server");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auth_failure_is_terminal_no_retry() {
        let remote = Arc::new(FixedRemote::new(|| {
            Err(ExecutionError::Auth("401".to_string()))
        }));
        let orchestrator =
            orchestrator(StaticProbe::healthy()).with_remote(remote.clone());
        let err = orchestrator
            .handle_utterance(&utterance("tell me a story about whales"))
            .unwrap_err();
        assert!(matches!(err, TandemError::RemoteAuthFailure(_)));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_on_device_falls_back_to_server() {
        // "summarize my email" classifies at 0.80: above the on-device
        // threshold and inside the hybrid band.
        let remote = Arc::new(FixedRemote::new(|| {
            Ok(ExecutionResponse::text_only("server saved it"))
        }));
        let model = Arc::new(FixedModel {
            result: || Err(ExecutionError::Model("weights corrupt".to_string())),
        });
        let orchestrator = orchestrator(StaticProbe::healthy())
            .with_remote(remote)
            .with_local_model(model);

        let response = orchestrator
            .handle_utterance(&utterance("summarize my email"))
            .expect("fallback to server");
        assert_eq!(response.text, "server saved it");
        assert_ne!(response.strategy, RoutingStrategy::OnDevice);
    }

    #[test]
    fn test_chain_exhaustion_reports_last_error() {
        let remote = Arc::new(FixedRemote::new(|| {
            Err(ExecutionError::Network("connection refused".to_string()))
        }));
        let orchestrator =
            orchestrator(StaticProbe::healthy()).with_remote(remote);
        let err = orchestrator
            .handle_utterance(&utterance("tell me a story about whales"))
            .unwrap_err();
        assert!(matches!(err, TandemError::RemoteNetworkFailure(_)));
    }

    #[test]
    fn test_companion_without_relay_executes_directly() {
        let remote = Arc::new(FixedRemote::new(|| {
            Ok(ExecutionResponse::text_only("direct"))
        }));
        let orchestrator = Orchestrator::with_store(
            CoreConfig::default(),
            DeviceRole::Companion,
            Arc::new(KeywordIntentSource::new()),
            Arc::new(StaticProbe::healthy()),
            Arc::new(MemoryStore::new()),
            Arc::new(Telemetry::with_enabled(false)),
        )
        .expect("orchestrator")
        .with_remote(remote);

        let response = orchestrator
            .handle_utterance(&utterance("tell me a story about whales"))
            .expect("direct answer");
        assert_eq!(response.text, "direct");
    }

    #[test]
    fn test_hybrid_substitutes_local_draft_when_server_fails() {
        let remote = Arc::new(FixedRemote::new(|| {
            Err(ExecutionError::Server("500".to_string()))
        }));
        let model = Arc::new(FixedModel {
            result: || Ok(ExecutionResponse::text_only("local draft")),
        });
        let orchestrator = orchestrator(StaticProbe::healthy())
            .with_remote(remote)
            .with_local_model(model);

        let classification =
            IntentClassification::new(crate::intent::IntentLabel::EmailSummary, 0.8, "email");
        let response = orchestrator
            .execute_hybrid(&classification)
            .expect("draft substitutes");
        assert_eq!(response.text, "local draft");
    }

    #[test]
    fn test_learning_state_reflects_outcomes() {
        let orchestrator = orchestrator(StaticProbe::healthy());
        let before = orchestrator.thresholds().get(RoutingStrategy::Offline);
        for _ in 0..5 {
            orchestrator
                .handle_utterance(&utterance("what time is it"))
                .expect("offline answer");
        }
        // Observations are asynchronous; poll briefly.
        for _ in 0..100 {
            if orchestrator.thresholds().get(RoutingStrategy::Offline) < before {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        // Threshold already at the floor is also acceptable.
        assert!((before - 0.30).abs() < 1e-4);
    }
}
