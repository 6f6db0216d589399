//! Routing module - Strategy selection and adaptive threshold learning.
//!
//! The routing engine turns `(classification, device snapshot, thresholds)`
//! into an immutable [`RoutingDecision`]; the strategy learner folds observed
//! [`Outcome`]s back into the threshold table the engine reads next time.
//! Learning state is the only long-lived mutable shared resource in the core
//! and follows single-writer discipline: only the learner's worker mutates
//! it, readers take an immutable snapshot per decision.

pub mod engine;
pub mod learner;
pub mod store;

pub use engine::{RoutingDecision, RoutingEngine, RoutingStrategy};
pub use learner::{LearnerReport, LearningState, Outcome, StrategyLearner, ThresholdSnapshot};
pub use store::{JsonFileStore, LearningStore, MemoryStore};
