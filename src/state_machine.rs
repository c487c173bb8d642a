// =============================================================================
// ThreatStateMachine — per-pool tier with two-sided hysteresis
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::ThreatTier;

/// One hysteresis band: climb above `up`, fall back below `down`. `down`
/// must be strictly less than `up` to avoid chatter at the boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HysteresisBand {
    pub up: f64,
    pub down: f64,
}

impl HysteresisBand {
    pub fn new(up: f64, down: f64) -> Self {
        assert!(down < up, "hysteresis band requires down < up ({down} >= {up})");
        Self { up, down }
    }
}

/// Per-pool threat-tier state machine. Strict inequalities at every boundary
/// mean a score exactly on the line never transitions.
#[derive(Debug, Clone)]
pub struct ThreatStateMachine {
    tier: ThreatTier,
    watch_to_elevated: HysteresisBand,
    elevated_to_critical: HysteresisBand,
}

impl ThreatStateMachine {
    pub fn new(watch_to_elevated: HysteresisBand, elevated_to_critical: HysteresisBand) -> Self {
        Self {
            tier: ThreatTier::Watch,
            watch_to_elevated,
            elevated_to_critical,
        }
    }

    pub fn tier(&self) -> ThreatTier {
        self.tier
    }

    /// Apply one score update. Transitions at most one tier per call —
    /// Watch to Critical requires two successive updates.
    pub fn update(&mut self, score: f64) -> (ThreatTier, bool) {
        let next = match self.tier {
            ThreatTier::Watch => {
                if score > self.watch_to_elevated.up {
                    ThreatTier::Elevated
                } else {
                    ThreatTier::Watch
                }
            }
            ThreatTier::Elevated => {
                if score < self.watch_to_elevated.down {
                    ThreatTier::Watch
                } else if score > self.elevated_to_critical.up {
                    ThreatTier::Critical
                } else {
                    ThreatTier::Elevated
                }
            }
            ThreatTier::Critical => {
                if score < self.elevated_to_critical.down {
                    ThreatTier::Elevated
                } else {
                    ThreatTier::Critical
                }
            }
        };

        let transitioned = next != self.tier;
        self.tier = next;
        (next, transitioned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> (HysteresisBand, HysteresisBand) {
        (HysteresisBand::new(35.0, 20.0), HysteresisBand::new(70.0, 50.0))
    }

    #[test]
    fn climbs_one_tier_at_a_time() {
        let (w, e) = bands();
        let mut sm = ThreatStateMachine::new(w, e);
        // A single huge score from Watch should land on Elevated, not Critical.
        let (tier, transitioned) = sm.update(99.0);
        assert_eq!(tier, ThreatTier::Elevated);
        assert!(transitioned);

        let (tier, transitioned) = sm.update(99.0);
        assert_eq!(tier, ThreatTier::Critical);
        assert!(transitioned);
    }

    #[test]
    fn exact_boundary_does_not_transition() {
        let (w, e) = bands();
        let mut sm = ThreatStateMachine::new(w, e);
        let (tier, transitioned) = sm.update(35.0);
        assert_eq!(tier, ThreatTier::Watch);
        assert!(!transitioned);
    }

    #[test]
    fn hysteresis_anti_flap_in_elevated_band() {
        let (w, e) = bands();
        let mut sm = ThreatStateMachine::new(w, e);
        sm.update(40.0); // -> Elevated
        assert_eq!(sm.tier(), ThreatTier::Elevated);

        for score in [20.01, 69.99, 35.0, 50.01, 65.0] {
            let (tier, _) = sm.update(score);
            assert_eq!(tier, ThreatTier::Elevated, "score {score} should stay Elevated");
        }
    }

    #[test]
    fn descends_one_tier_at_a_time_from_critical() {
        let (w, e) = bands();
        let mut sm = ThreatStateMachine::new(w, e);
        sm.update(99.0);
        sm.update(99.0);
        assert_eq!(sm.tier(), ThreatTier::Critical);

        let (tier, transitioned) = sm.update(10.0);
        assert_eq!(tier, ThreatTier::Elevated);
        assert!(transitioned);

        let (tier, transitioned) = sm.update(10.0);
        assert_eq!(tier, ThreatTier::Watch);
        assert!(transitioned);
    }

    #[test]
    #[should_panic(expected = "down < up")]
    fn rejects_inverted_band() {
        HysteresisBand::new(10.0, 20.0);
    }
}
