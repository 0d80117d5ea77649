//! # harbor-runtime
//!
//! The turn-by-turn brain of the companion agent: per inbound message it
//! assembles a bounded context bundle from the memory tiers, derives a
//! behavioral directive, calls the generation service, and persists the
//! exchange as task-tier memory.

pub mod composer;
pub mod pipeline;
pub mod policy;
pub mod signals;

pub use composer::{ContextBundle, ContextComposer, MAX_BUNDLE_RECORDS};
pub use pipeline::{ConversationPipeline, TurnOutcome};
pub use policy::{Directive, EnergyLevel, PolicyEngine, ResponseMode};
pub use signals::{
    derive_emotional_state, EmotionalState, EnergyEstimator, GoalRelevancePredicate,
    HeuristicEnergy, KeywordRelevance,
};
