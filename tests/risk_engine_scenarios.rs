// =============================================================================
// End-to-end Risk Engine scenarios
// =============================================================================
//
// Each scenario drives a fresh RiskEngine with emaAlpha = 0.5 and tightened
// hysteresis bands ({up 30, down 15} / {up 65, down 40}), matching the
// scenario configuration.

use sentinel_core::config::RiskEngineConfig;
use sentinel_core::risk_engine::{IngestOutcome, RiskEngine};
use sentinel_core::types::{DefenseAction, RawSignal, SignalKind, ThreatTier};

fn scenario_config() -> RiskEngineConfig {
    let mut config = RiskEngineConfig::default();
    config.ema_alpha = 0.5;
    config.watch_to_elevated = (30.0, 15.0);
    config.elevated_to_critical = (65.0, 40.0);
    config
}

fn signal(kind: SignalKind, pool: &str, magnitude: f64, ts: i64) -> RawSignal {
    RawSignal::new(kind, "ethereum", "ETH/USDC", pool, magnitude, ts)
}

#[test]
fn mev_burst_produces_mev_protection_decision() {
    let engine = RiskEngine::new(scenario_config());

    let mut outcomes = Vec::new();
    outcomes.push(engine.ingest_signal(&signal(SignalKind::FlashLoan, "P", 0.95, 0)));
    outcomes.push(engine.ingest_signal(&signal(SignalKind::GasSpike, "P", 0.90, 100)));
    outcomes.push(engine.ingest_signal(&signal(SignalKind::LargeSwap, "P", 0.85, 200)));

    let decisions: Vec<_> = outcomes
        .into_iter()
        .filter_map(|o| match o {
            IngestOutcome::Decision(d) => Some(d),
            _ => None,
        })
        .collect();

    assert!(!decisions.is_empty(), "expected at least one decision from the MEV burst");
    let last = decisions.last().unwrap();
    assert!(matches!(last.action, DefenseAction::MevProtection { fee_bps } if (32..=200).contains(&fee_bps)));
    assert!(matches!(last.tier, ThreatTier::Elevated | ThreatTier::Critical));
    assert_eq!(last.pool_key, "P");
}

#[test]
fn oracle_alert_produces_oracle_validation_decision() {
    let engine = RiskEngine::new(scenario_config());

    engine.ingest_signal(&signal(SignalKind::OracleManipulation, "Q", 0.45, 0));
    let outcome = engine.ingest_signal(&signal(SignalKind::OracleManipulation, "Q", 0.60, 500));

    let decision = match outcome {
        IngestOutcome::Decision(d) => d,
        _ => engine.last_decision("Q").expect("expected an eventual OracleValidation decision"),
    };
    assert_eq!(decision.action, DefenseAction::OracleValidation);
    assert_eq!(decision.tier, ThreatTier::Elevated);
}

#[test]
fn coordinated_critical_attack_produces_circuit_breaker() {
    let engine = RiskEngine::new(scenario_config());

    for kind in [SignalKind::FlashLoan, SignalKind::GasSpike, SignalKind::LargeSwap, SignalKind::PriceMove] {
        engine.ingest_signal(&signal(kind, "R", 0.99, 0));
    }
    for kind in [SignalKind::FlashLoan, SignalKind::GasSpike, SignalKind::LargeSwap, SignalKind::PriceMove] {
        engine.ingest_signal(&signal(kind, "R", 0.99, 100));
    }
    let outcome = engine.ingest_signal(&signal(SignalKind::OracleManipulation, "R", 0.95, 200));

    let decision = match outcome {
        IngestOutcome::Decision(d) => d,
        _ => engine.last_decision("R").expect("expected a CircuitBreaker decision by the end of the sequence"),
    };
    assert!(matches!(decision.action, DefenseAction::CircuitBreaker { .. }));
    assert_eq!(decision.tier, ThreatTier::Critical);
}

#[test]
fn single_weak_signal_emits_no_decision() {
    let engine = RiskEngine::new(scenario_config());
    let outcome = engine.ingest_signal(&signal(SignalKind::FlashLoan, "S", 0.6, 0));
    assert!(matches!(outcome, IngestOutcome::NoChange));
    assert!(engine.last_decision("S").is_none());
}

#[test]
fn down_transition_clears_or_holds_without_ever_producing_circuit_breaker() {
    let engine = RiskEngine::new(scenario_config());

    engine.ingest_signal(&signal(SignalKind::MempoolCluster, "T", 0.95, 0));
    let escalated = engine.ingest_signal(&signal(SignalKind::FlashLoan, "T", 0.95, 100));
    assert!(matches!(escalated, IngestOutcome::Decision(_)));

    // Jump far past the correlation window with a tiny signal.
    let outcome = engine.ingest_signal(&signal(SignalKind::PriceMove, "T", 0.01, 10_000_000));

    match outcome {
        IngestOutcome::Cleared(c) => assert_eq!(c.tier, ThreatTier::Watch),
        IngestOutcome::Decision(d) => assert!(!matches!(d.action, DefenseAction::CircuitBreaker { .. })),
        IngestOutcome::NoChange => {
            let tier = engine.pool_tier("T").unwrap();
            assert!(matches!(tier, ThreatTier::Elevated | ThreatTier::Watch));
        }
    }
}
