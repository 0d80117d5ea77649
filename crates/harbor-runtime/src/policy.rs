use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::composer::ContextBundle;
use crate::signals::{derive_emotional_state, EmotionalState, EnergyEstimator};

/// Estimated user energy for the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

/// Tone guidance consumed by prompt construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Well-being preservation: validate feelings, offer a break.
    ValidateAndOfferBreak,
    /// The user has momentum — push forward.
    MomentumPush,
    Standard,
}

/// The policy engine's output for one turn. Never mutated state — a fresh
/// directive is derived per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub energy_level: EnergyLevel,
    pub emotional_state: EmotionalState,
    pub circuit_breaker_triggered: bool,
    pub response_mode: ResponseMode,
}

/// Local hours that count as late evening for the circuit breaker.
pub fn is_late_evening(hour: u32) -> bool {
    hour >= 21 || hour < 2
}

/// Stateless derivation of behavioral directives.
///
/// `evaluate` is a pure function of its arguments, with no I/O and no
/// access to global time, so every rule here is unit-testable.
pub struct PolicyEngine {
    stressor_threshold: usize,
    energy: Arc<dyn EnergyEstimator>,
}

impl PolicyEngine {
    pub fn new(stressor_threshold: usize, energy: Arc<dyn EnergyEstimator>) -> Self {
        Self {
            stressor_threshold,
            energy,
        }
    }

    pub fn evaluate(
        &self,
        message: &str,
        bundle: &ContextBundle,
        emotional_signal: Option<EmotionalState>,
        local_hour: u32,
    ) -> Directive {
        // External signal overrides the heuristic when present.
        let emotional_state =
            emotional_signal.unwrap_or_else(|| derive_emotional_state(message));
        let energy_level = self.energy.estimate(message);

        // Conjunctive trigger: all three conditions are required.
        let circuit_breaker_triggered = bundle.stressors.len() > self.stressor_threshold
            && emotional_state.is_overwhelmed()
            && is_late_evening(local_hour);

        let response_mode = if circuit_breaker_triggered {
            ResponseMode::ValidateAndOfferBreak
        } else if energy_level == EnergyLevel::High {
            ResponseMode::MomentumPush
        } else {
            ResponseMode::Standard
        };

        Directive {
            energy_level,
            emotional_state,
            circuit_breaker_triggered,
            response_mode,
        }
    }
}
