//! Pluggable heuristics over message text. These are the MVP keyword
//! strategies; a learned classifier can replace any of them by
//! implementing the trait, without touching pipeline or storage code.

use serde::{Deserialize, Serialize};

use crate::policy::EnergyLevel;

/// Derived or externally-supplied emotional state for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalState {
    Neutral,
    Calm,
    Focused,
    Overwhelm,
    Fear,
}

impl EmotionalState {
    /// States that satisfy the circuit breaker's overwhelm condition.
    pub fn is_overwhelmed(&self) -> bool {
        matches!(self, EmotionalState::Overwhelm | EmotionalState::Fear)
    }
}

/// Decides whether a message warrants pulling project-tier context.
pub trait GoalRelevancePredicate: Send + Sync {
    /// `Some(reason)` when the message looks goal-relevant.
    fn goal_relevance(&self, message: &str) -> Option<String>;
}

/// Keyword-gated goal relevance.
pub struct KeywordRelevance {
    keywords: Vec<String>,
}

impl Default for KeywordRelevance {
    fn default() -> Self {
        Self {
            keywords: [
                "goal", "project", "mission", "plan", "progress", "deadline", "milestone",
                "task", "finish", "work on",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl KeywordRelevance {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

impl GoalRelevancePredicate for KeywordRelevance {
    fn goal_relevance(&self, message: &str) -> Option<String> {
        let lower = message.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lower.contains(k.as_str()))
            .map(|k| format!("matched keyword '{k}'"))
    }
}

/// Estimates the user's energy level from a message.
pub trait EnergyEstimator: Send + Sync {
    fn estimate(&self, message: &str) -> EnergyLevel;
}

/// Length- and cue-word-based energy estimate.
pub struct HeuristicEnergy;

const LOW_ENERGY_CUES: &[&str] = &[
    "tired", "exhausted", "drained", "can't", "cannot", "too much", "give up", "worn out",
];
const HIGH_ENERGY_CUES: &[&str] = &[
    "excited", "let's go", "ready", "pumped", "can't wait", "amazing", "great",
];

impl EnergyEstimator for HeuristicEnergy {
    fn estimate(&self, message: &str) -> EnergyLevel {
        let lower = message.to_lowercase();
        if LOW_ENERGY_CUES.iter().any(|c| lower.contains(c)) {
            return EnergyLevel::Low;
        }
        if HIGH_ENERGY_CUES.iter().any(|c| lower.contains(c)) || message.contains('!') {
            return EnergyLevel::High;
        }
        // Very short messages read as low engagement
        if message.split_whitespace().count() < 3 {
            EnergyLevel::Low
        } else {
            EnergyLevel::Medium
        }
    }
}

const OVERWHELM_CUES: &[&str] = &["overwhelmed", "too much", "drowning", "can't keep up"];
const FEAR_CUES: &[&str] = &["scared", "afraid", "anxious", "panic", "terrified"];
const CALM_CUES: &[&str] = &["calm", "relaxed", "peaceful", "fine"];

/// Fallback emotional-state heuristic, used when no external signal is
/// supplied for the turn.
pub fn derive_emotional_state(message: &str) -> EmotionalState {
    let lower = message.to_lowercase();
    if FEAR_CUES.iter().any(|c| lower.contains(c)) {
        EmotionalState::Fear
    } else if OVERWHELM_CUES.iter().any(|c| lower.contains(c)) {
        EmotionalState::Overwhelm
    } else if CALM_CUES.iter().any(|c| lower.contains(c)) {
        EmotionalState::Calm
    } else {
        EmotionalState::Neutral
    }
}
