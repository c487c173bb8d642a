// =============================================================================
// decision_mapper — pure (tier, score, signals) -> (action, rationale) mapping
// =============================================================================

use crate::types::{DefenseAction, ScoredSignal, SignalKind, ThreatTier};

const MIN_FEE_BPS: f64 = 32.0;
const MAX_FEE_BPS: f64 = 200.0;

/// Dynamic MEV-protection fee, linearly interpolated between 32bps and
/// 200bps over `[0, 100]` composite score.
fn mev_fee_bps(composite_score: f64) -> u32 {
    let clamped = composite_score.clamp(0.0, 100.0);
    let bps = MIN_FEE_BPS + (clamped / 100.0) * (MAX_FEE_BPS - MIN_FEE_BPS);
    bps.round() as u32
}

fn has_kind(signals: &[ScoredSignal], pred: impl Fn(SignalKind) -> bool) -> bool {
    signals.iter().any(|s| pred(s.source))
}

fn mev_present(signals: &[ScoredSignal]) -> bool {
    has_kind(signals, SignalKind::is_mev)
}

fn oracle_present(signals: &[ScoredSignal]) -> bool {
    has_kind(signals, SignalKind::is_oracle)
}

fn cross_chain_attack_present(signals: &[ScoredSignal]) -> bool {
    has_kind(signals, |k| matches!(k, SignalKind::CrossChainAttack))
}

/// Max magnitude among oracle-classified signals (`OracleManipulation` or
/// `CrossChainInconsistency`), or `0.0` if none are present.
fn max_oracle_magnitude(signals: &[ScoredSignal]) -> f64 {
    signals
        .iter()
        .filter(|s| s.source.is_oracle())
        .map(|s| s.magnitude)
        .fold(0.0, f64::max)
}

fn unique_kind_count(signals: &[ScoredSignal]) -> usize {
    use std::collections::HashSet;
    signals.iter().map(|s| s.source).collect::<HashSet<_>>().len()
}

fn mev_protection(composite_score: f64, rationale: String) -> (DefenseAction, String) {
    (DefenseAction::MevProtection { fee_bps: mev_fee_bps(composite_score) }, rationale)
}

/// Map a tier, composite score, and the signals that produced it onto a
/// concrete defense action with a human-readable rationale. Pure function —
/// no I/O, no mutable state. Rules are evaluated in order; the first
/// matching rule wins.
pub fn map_decision(
    tier: ThreatTier,
    composite_score: f64,
    signals: &[ScoredSignal],
) -> Option<(DefenseAction, String)> {
    if tier == ThreatTier::Watch {
        return None;
    }

    let mev = mev_present(signals);
    let oracle = oracle_present(signals);
    let o = max_oracle_magnitude(signals);

    // Rule 2: CrossChainAttack takes priority when present, but only the
    // sub-branches below match — if none fire, control falls through.
    if cross_chain_attack_present(signals) {
        if tier == ThreatTier::Critical && composite_score > 85.0 {
            return Some((
                DefenseAction::EmergencyBridge,
                format!("cross-chain attack at Critical (score {composite_score:.1} > 85)"),
            ));
        }
        if tier == ThreatTier::Critical && oracle {
            return Some((
                DefenseAction::LiquidityReroute,
                format!("cross-chain attack with oracle corroboration at Critical (score {composite_score:.1})"),
            ));
        }
        if mev {
            return Some((
                DefenseAction::CrossChainArbBlock,
                format!("cross-chain attack with MEV signal present (score {composite_score:.1})"),
            ));
        }
        if tier == ThreatTier::Elevated {
            return Some((
                DefenseAction::LiquidityReroute,
                format!("cross-chain attack at Elevated (score {composite_score:.1})"),
            ));
        }
    }

    match tier {
        ThreatTier::Watch => unreachable!(),

        ThreatTier::Critical => {
            let distinct = unique_kind_count(signals);
            if o > 0.75 || (o > 0.0 && oracle && distinct >= 4 && mev) {
                Some((
                    DefenseAction::CircuitBreaker {
                        reason: "coordinated multi-signal attack".to_string(),
                    },
                    format!("oracle magnitude {o:.2} with {distinct} distinct signal kinds at Critical (score {composite_score:.1})"),
                ))
            } else if o > 0.05 && o <= 0.3 && mev {
                Some(mev_protection(
                    composite_score,
                    format!("toxic-arb pattern: oracle magnitude {o:.2} with MEV signal at Critical (score {composite_score:.1})"),
                ))
            } else if oracle {
                Some((
                    DefenseAction::OracleValidation,
                    format!("oracle signal at Critical (score {composite_score:.1})"),
                ))
            } else {
                Some(mev_protection(
                    composite_score,
                    format!("MEV signal at Critical (score {composite_score:.1})"),
                ))
            }
        }

        ThreatTier::Elevated => {
            if oracle && mev && o <= 0.3 {
                Some(mev_protection(
                    composite_score,
                    format!("oracle + MEV at Elevated, oracle magnitude {o:.2} <= 0.3 (score {composite_score:.1})"),
                ))
            } else if oracle && mev {
                Some((
                    DefenseAction::OracleValidation,
                    format!("oracle + MEV at Elevated, oracle magnitude {o:.2} (score {composite_score:.1})"),
                ))
            } else if oracle {
                Some((
                    DefenseAction::OracleValidation,
                    format!("oracle signal at Elevated (score {composite_score:.1})"),
                ))
            } else if mev {
                Some(mev_protection(
                    composite_score,
                    format!("MEV signal at Elevated (score {composite_score:.1})"),
                ))
            } else {
                Some(mev_protection(
                    composite_score,
                    format!("fallback at Elevated (score {composite_score:.1})"),
                ))
            }
        }
    }
}
