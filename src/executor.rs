// =============================================================================
// Executor Scheduler — debounce, priority, and the active-protection table
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bus::{ExecutionFailed, ExecutionSuccess, MessageBus, ProtectionExpired, ThreatBroadcast};
use crate::config::ExecutorConfig;
use crate::protector::{CrossChainDefender, PoolProtector};
use crate::types::{ActiveProtection, DefenseAction, RiskDecision};

/// Proof material passed through to `PoolProtector`/`CrossChainDefender`
/// calls. Opaque to the scheduler; supplied by the caller's adapter layer.
pub const NO_PROOF: &str = "";

struct PendingDecision {
    decision: RiskDecision,
}

/// Consumes RiskDecisions, coalesces bursts per pool, and manages the
/// per-pool active-protection lifecycle on behalf of one or more chains.
pub struct Executor {
    config: ExecutorConfig,
    pending: Mutex<HashMap<String, PendingDecision>>,
    active: Mutex<HashMap<String, ActiveProtection>>,
    protector: Arc<dyn PoolProtector>,
    defender: Arc<dyn CrossChainDefender>,
    bus: Arc<MessageBus>,
}

impl Executor {
    pub fn new(
        config: ExecutorConfig,
        protector: Arc<dyn PoolProtector>,
        defender: Arc<dyn CrossChainDefender>,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            protector,
            defender,
            bus,
        }
    }

    pub fn decision_debounce_ms(&self) -> i64 {
        self.config.decision_debounce_ms
    }

    pub fn monitor_interval_ms(&self) -> i64 {
        self.config.monitor_interval_ms
    }

    /// Arm (or coalesce into) the per-pool pending slot. Keeps the
    /// higher-priority decision on conflict, the newer one on a tie.
    pub fn submit(&self, decision: RiskDecision) {
        let mut pending = self.pending.lock();
        match pending.get(&decision.pool_key) {
            Some(existing) if existing.decision.tier.priority() > decision.tier.priority() => {
                info!(pool_key = %decision.pool_key, "discarding lower-priority decision in favor of pending one");
            }
            _ => {
                pending.insert(decision.pool_key.clone(), PendingDecision { decision });
            }
        }
    }

    /// Flush all currently pending decisions, executing each. Call on
    /// debounce-timer fire.
    pub async fn flush(&self) {
        let decisions: Vec<RiskDecision> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, p)| p.decision).collect()
        };

        for decision in decisions {
            self.execute(decision).await;
        }
    }

    async fn execute(&self, decision: RiskDecision) {
        use crate::types::ThreatTier;

        if decision.tier == ThreatTier::Elevated && !decision.action.is_cross_chain() {
            self.bus.threat_broadcast.publish(ThreatBroadcast {
                pool_key: decision.pool_key.clone(),
                score: decision.composite_score,
                action: decision.action.clone(),
            });
            return;
        }

        if decision.action.is_cross_chain() {
            self.execute_cross_chain(decision).await;
            return;
        }

        // Critical, non-cross-chain: deactivate existing protection
        // (circuit first, then fee), then activate the new action.
        self.deactivate_existing(&decision.pool_key).await;

        let result = match &decision.action {
            DefenseAction::MevProtection { fee_bps } => {
                self.protector.activate_fee_protection(&decision.pool_key, *fee_bps, NO_PROOF).await
            }
            DefenseAction::OracleValidation => {
                self.protector.activate_oracle_check(&decision.pool_key, "default", 500, NO_PROOF).await
            }
            DefenseAction::CircuitBreaker { reason } => {
                self.protector.pause_circuit(&decision.pool_key, reason, NO_PROOF).await
            }
            _ => unreachable!("cross-chain actions handled above"),
        };

        self.record_execution_outcome(&decision, result);
    }

    async fn execute_cross_chain(&self, decision: RiskDecision) {
        let result = match &decision.action {
            DefenseAction::LiquidityReroute => self.defender.reroute_liquidity(&decision.pool_key, NO_PROOF).await,
            DefenseAction::CrossChainArbBlock => self.defender.block_cross_chain_arb(&decision.pool_key, NO_PROOF).await,
            DefenseAction::EmergencyBridge => self.defender.emergency_bridge_pause(&decision.pool_key, NO_PROOF).await,
            _ => unreachable!("non-cross-chain action routed to cross-chain handler"),
        };
        self.record_execution_outcome(&decision, result);
    }

    fn record_execution_outcome(&self, decision: &RiskDecision, result: Result<String, crate::error::SentinelError>) {
        match result {
            Ok(handle) => {
                self.active.lock().insert(
                    decision.pool_key.clone(),
                    ActiveProtection {
                        pool_key: decision.pool_key.clone(),
                        chain: decision.chain.clone(),
                        action: Some(decision.action.clone()),
                        activated_at_ms: decision.timestamp_ms,
                        expires_at_ms: decision.expires_at_ms(),
                        external_handle: Some(handle.clone()),
                    },
                );
                self.bus.execution_success.publish(ExecutionSuccess {
                    decision_id: decision.id.clone(),
                    pool_key: decision.pool_key.clone(),
                    external_handle: handle,
                });
                info!(pool_key = %decision.pool_key, decision_id = %decision.id, "decision executed");
            }
            Err(err) => {
                warn!(pool_key = %decision.pool_key, decision_id = %decision.id, error = %err, "execution failed");
                self.bus.execution_failed.publish(ExecutionFailed {
                    decision_id: decision.id.clone(),
                    pool_key: decision.pool_key.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    async fn deactivate_existing(&self, pool_key: &str) {
        if self.protector.is_circuit_active(pool_key).await.unwrap_or(false) {
            if let Err(err) = self.protector.deactivate_circuit(pool_key, NO_PROOF).await {
                warn!(pool_key, error = %err, "failed to deactivate existing circuit breaker before new activation");
            }
        }
        if self.protector.is_fee_active(pool_key).await.unwrap_or(false) {
            if let Err(err) = self.protector.deactivate_fee(pool_key, NO_PROOF).await {
                warn!(pool_key, error = %err, "failed to deactivate existing fee protection before new activation");
            }
        }
    }

    /// Run one monitor tick: expire any `ActiveProtection` past its TTL,
    /// deactivate it, and mark the entry as expired (retained one more
    /// tick for observability, then removed).
    pub async fn monitor_tick(&self, now_ms: i64) {
        // Entries already marked expired (action == None) by a prior tick
        // have served their one-tick observability window; remove them now.
        self.active.lock().retain(|_, p| p.is_active());

        let expired_keys: Vec<String> = {
            let active = self.active.lock();
            active
                .iter()
                .filter(|(_, p)| p.is_active() && now_ms > p.expires_at_ms)
                .map(|(k, _)| k.clone())
                .collect()
        };

        for pool_key in &expired_keys {
            let chain = self.active.lock().get(pool_key).map(|p| p.chain.clone()).unwrap_or_default();

            if self.protector.is_fee_active(pool_key).await.unwrap_or(false) {
                let _ = self.protector.deactivate_fee(pool_key, NO_PROOF).await;
            }
            if self.protector.is_circuit_active(pool_key).await.unwrap_or(false) {
                let _ = self.protector.deactivate_circuit(pool_key, NO_PROOF).await;
            }

            if let Some(entry) = self.active.lock().get_mut(pool_key) {
                entry.action = None;
            }

            self.bus.protection_expired.publish(ProtectionExpired {
                pool_key: pool_key.clone(),
                chain,
                expired_at_ms: now_ms,
            });
        }
    }

    pub fn active_protections(&self) -> Vec<ActiveProtection> {
        self.active.lock().values().cloned().collect()
    }

    pub fn protection_state(&self, pool_key: &str) -> Option<ActiveProtection> {
        self.active.lock().get(pool_key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protector::{DemoCrossChainDefender, DemoPoolProtector};
    use crate::types::{DefenseAction, ThreatTier};

    fn decision(tier: ThreatTier, action: DefenseAction, pool_key: &str, ttl_ms: u64) -> RiskDecision {
        RiskDecision {
            id: format!("risk-{pool_key}"),
            pool_key: pool_key.to_string(),
            chain: "ethereum".to_string(),
            pair: "ETH/USDC".to_string(),
            tier,
            composite_score: 80.0,
            action,
            rationale: "test".to_string(),
            contributing_signals: vec![],
            timestamp_ms: 0,
            ttl_ms,
        }
    }

    fn executor() -> (Executor, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        let executor = Executor::new(
            ExecutorConfig::default(),
            Arc::new(DemoPoolProtector::default()),
            Arc::new(DemoCrossChainDefender),
            bus.clone(),
        );
        (executor, bus)
    }

    #[tokio::test]
    async fn critical_decision_activates_protection() {
        let (executor, _bus) = executor();
        executor.submit(decision(ThreatTier::Critical, DefenseAction::MevProtection { fee_bps: 100 }, "pool-1", 10_000));
        executor.flush().await;
        let active = executor.protection_state("pool-1");
        assert!(active.is_some());
        assert!(active.unwrap().is_active());
    }

    #[tokio::test]
    async fn elevated_non_cross_chain_is_advisory_only() {
        let (executor, bus) = executor();
        let mut rx = bus.threat_broadcast.subscribe();
        executor.submit(decision(ThreatTier::Elevated, DefenseAction::MevProtection { fee_bps: 50 }, "pool-1", 10_000));
        executor.flush().await;
        assert!(executor.protection_state("pool-1").is_none());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn higher_priority_decision_wins_debounce_conflict() {
        let (executor, _bus) = executor();
        executor.submit(decision(ThreatTier::Elevated, DefenseAction::MevProtection { fee_bps: 50 }, "pool-1", 10_000));
        executor.submit(decision(ThreatTier::Critical, DefenseAction::CircuitBreaker { reason: "x".into() }, "pool-1", 10_000));
        executor.flush().await;
        let active = executor.protection_state("pool-1").unwrap();
        assert!(matches!(active.action, Some(DefenseAction::CircuitBreaker { .. })));
    }

    #[tokio::test]
    async fn monitor_tick_expires_protection_past_ttl() {
        let (executor, bus) = executor();
        let mut rx = bus.protection_expired.subscribe();
        executor.submit(decision(ThreatTier::Critical, DefenseAction::MevProtection { fee_bps: 100 }, "pool-1", 1_000));
        executor.flush().await;

        executor.monitor_tick(500).await;
        assert!(executor.protection_state("pool-1").unwrap().is_active());

        executor.monitor_tick(2_000).await;
        let state = executor.protection_state("pool-1");
        assert!(state.is_none() || !state.unwrap().is_active());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn cross_chain_action_dispatches_to_defender_without_fee_circuit_churn() {
        let (executor, _bus) = executor();
        executor.submit(decision(ThreatTier::Critical, DefenseAction::LiquidityReroute, "pool-1", 10_000));
        executor.flush().await;
        let active = executor.protection_state("pool-1").unwrap();
        assert!(matches!(active.action, Some(DefenseAction::LiquidityReroute)));
    }
}
