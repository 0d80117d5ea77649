#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use harbor_core::{attrs, MemoryRecord, Tier};
    use harbor_runtime::policy::is_late_evening;
    use harbor_runtime::signals::{derive_emotional_state, HeuristicEnergy};
    use harbor_runtime::{ContextBundle, EmotionalState, EnergyLevel, PolicyEngine, ResponseMode};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(5, Arc::new(HeuristicEnergy))
    }

    fn stressor(content: &str) -> MemoryRecord {
        MemoryRecord::new("u1", Tier::Personal, content)
            .with_attr(attrs::STRESSOR, serde_json::json!(true))
    }

    fn bundle_with_stressors(n: usize) -> ContextBundle {
        let mut bundle = ContextBundle::default();
        for i in 0..n {
            bundle.stressors.push(stressor(&format!("stressor {i}")));
        }
        bundle
    }

    // ── Circuit breaker ────────────────────────────────────────

    #[test]
    fn test_breaker_fires_when_all_three_conditions_hold() {
        let directive = engine().evaluate(
            "everything is falling apart",
            &bundle_with_stressors(6),
            Some(EmotionalState::Fear),
            23,
        );
        assert!(directive.circuit_breaker_triggered);
        assert_eq!(directive.response_mode, ResponseMode::ValidateAndOfferBreak);
    }

    #[test]
    fn test_breaker_silent_during_daytime() {
        // Same stressor load and emotional state, but mid-morning.
        let directive = engine().evaluate(
            "everything is falling apart",
            &bundle_with_stressors(6),
            Some(EmotionalState::Fear),
            10,
        );
        assert!(!directive.circuit_breaker_triggered);
        assert_ne!(directive.response_mode, ResponseMode::ValidateAndOfferBreak);
    }

    #[test]
    fn test_breaker_needs_more_than_threshold_stressors() {
        // Exactly at threshold is not over it.
        let directive = engine().evaluate(
            "everything is falling apart",
            &bundle_with_stressors(5),
            Some(EmotionalState::Overwhelm),
            23,
        );
        assert!(!directive.circuit_breaker_triggered);
    }

    #[test]
    fn test_breaker_silent_when_not_overwhelmed() {
        let directive = engine().evaluate(
            "busy week but managing",
            &bundle_with_stressors(6),
            Some(EmotionalState::Calm),
            23,
        );
        assert!(!directive.circuit_breaker_triggered);
    }

    #[test]
    fn test_overwhelm_derived_from_message_when_no_signal() {
        let directive = engine().evaluate(
            "I am drowning, it is all too much",
            &bundle_with_stressors(6),
            None,
            22,
        );
        assert_eq!(directive.emotional_state, EmotionalState::Overwhelm);
        assert!(directive.circuit_breaker_triggered);
    }

    #[test]
    fn test_external_signal_overrides_heuristic() {
        // The text reads calm but the caller says otherwise.
        let directive = engine().evaluate(
            "I feel fine",
            &bundle_with_stressors(6),
            Some(EmotionalState::Overwhelm),
            23,
        );
        assert_eq!(directive.emotional_state, EmotionalState::Overwhelm);
        assert!(directive.circuit_breaker_triggered);
    }

    // ── Late-evening window ────────────────────────────────────

    #[test]
    fn test_late_evening_boundaries() {
        assert!(!is_late_evening(20));
        assert!(is_late_evening(21));
        assert!(is_late_evening(23));
        assert!(is_late_evening(0));
        assert!(is_late_evening(1));
        assert!(!is_late_evening(2));
        assert!(!is_late_evening(12));
    }

    // ── Response modes ─────────────────────────────────────────

    #[test]
    fn test_high_energy_gets_momentum_push() {
        let directive = engine().evaluate(
            "I'm so excited, let's go!",
            &ContextBundle::default(),
            None,
            10,
        );
        assert_eq!(directive.energy_level, EnergyLevel::High);
        assert_eq!(directive.response_mode, ResponseMode::MomentumPush);
    }

    #[test]
    fn test_default_mode_is_standard() {
        let directive = engine().evaluate(
            "what should I make for dinner tonight",
            &ContextBundle::default(),
            None,
            10,
        );
        assert_eq!(directive.response_mode, ResponseMode::Standard);
        assert!(!directive.circuit_breaker_triggered);
    }

    #[test]
    fn test_breaker_outranks_momentum_push() {
        // High energy punctuation plus a fearful signal late at night:
        // safety wins over momentum.
        let directive = engine().evaluate(
            "I have to finish everything tonight!",
            &bundle_with_stressors(6),
            Some(EmotionalState::Fear),
            23,
        );
        assert!(directive.circuit_breaker_triggered);
        assert_eq!(directive.response_mode, ResponseMode::ValidateAndOfferBreak);
    }

    // ── Emotional-state heuristic ──────────────────────────────

    #[test]
    fn test_fear_cues_outrank_overwhelm_cues() {
        let state = derive_emotional_state("I'm anxious and it's too much");
        assert_eq!(state, EmotionalState::Fear);
    }

    #[test]
    fn test_neutral_when_no_cues_match() {
        let state = derive_emotional_state("thinking about the weekend");
        assert_eq!(state, EmotionalState::Neutral);
    }
}
