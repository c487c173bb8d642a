// =============================================================================
// Abstract external collaborators — on-chain defense actuation
// =============================================================================
//
// The Executor scheduler calls out to these capabilities; the concrete
// on-chain binding (ABI encoding, signing, gas estimation) is an external
// collaborator outside this crate's scope. The demo implementations here
// are deterministic in-memory fixtures.
// =============================================================================

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{ProtectorErrorKind, SentinelError};

pub type ProtectorResult<T> = Result<T, SentinelError>;

/// Capability for activating/deactivating single-chain pool protections.
#[async_trait]
pub trait PoolProtector: Send + Sync {
    async fn activate_fee_protection(&self, pool_key: &str, fee_bps: u32, proof: &str) -> ProtectorResult<String>;
    async fn activate_oracle_check(&self, pool_key: &str, feed: &str, threshold_bps: u32, proof: &str) -> ProtectorResult<String>;
    async fn pause_circuit(&self, pool_key: &str, reason: &str, proof: &str) -> ProtectorResult<String>;
    async fn deactivate_fee(&self, pool_key: &str, proof: &str) -> ProtectorResult<()>;
    async fn deactivate_circuit(&self, pool_key: &str, proof: &str) -> ProtectorResult<()>;
    async fn is_fee_active(&self, pool_key: &str) -> ProtectorResult<bool>;
    async fn is_circuit_active(&self, pool_key: &str) -> ProtectorResult<bool>;
}

/// Capability for cross-chain defense actions: liquidity reroutes, arb
/// blocks, and emergency bridge pauses. Opaque beyond a synthetic handle.
#[async_trait]
pub trait CrossChainDefender: Send + Sync {
    async fn reroute_liquidity(&self, pool_key: &str, proof: &str) -> ProtectorResult<String>;
    async fn block_cross_chain_arb(&self, pool_key: &str, proof: &str) -> ProtectorResult<String>;
    async fn emergency_bridge_pause(&self, pool_key: &str, proof: &str) -> ProtectorResult<String>;
}

/// In-memory demo `PoolProtector` tracking active fee/circuit state per
/// pool. Every call succeeds deterministically; used by the demo binary
/// and integration tests, never a production on-chain binding.
#[derive(Default)]
pub struct DemoPoolProtector {
    fee_active: Mutex<HashSet<String>>,
    circuit_active: Mutex<HashSet<String>>,
}

#[async_trait]
impl PoolProtector for DemoPoolProtector {
    async fn activate_fee_protection(&self, pool_key: &str, _fee_bps: u32, _proof: &str) -> ProtectorResult<String> {
        self.fee_active.lock().insert(pool_key.to_string());
        Ok(format!("handle-fee-{}", Uuid::new_v4()))
    }

    async fn activate_oracle_check(&self, _pool_key: &str, _feed: &str, _threshold_bps: u32, _proof: &str) -> ProtectorResult<String> {
        Ok(format!("handle-oracle-{}", Uuid::new_v4()))
    }

    async fn pause_circuit(&self, pool_key: &str, reason: &str, _proof: &str) -> ProtectorResult<String> {
        if reason.is_empty() {
            return Err(SentinelError::Protector {
                kind: ProtectorErrorKind::Permanent,
                pool_key: pool_key.to_string(),
                message: "circuit breaker reason must not be empty".to_string(),
            });
        }
        self.circuit_active.lock().insert(pool_key.to_string());
        Ok(format!("handle-circuit-{}", Uuid::new_v4()))
    }

    async fn deactivate_fee(&self, pool_key: &str, _proof: &str) -> ProtectorResult<()> {
        self.fee_active.lock().remove(pool_key);
        Ok(())
    }

    async fn deactivate_circuit(&self, pool_key: &str, _proof: &str) -> ProtectorResult<()> {
        self.circuit_active.lock().remove(pool_key);
        Ok(())
    }

    async fn is_fee_active(&self, pool_key: &str) -> ProtectorResult<bool> {
        Ok(self.fee_active.lock().contains(pool_key))
    }

    async fn is_circuit_active(&self, pool_key: &str) -> ProtectorResult<bool> {
        Ok(self.circuit_active.lock().contains(pool_key))
    }
}

/// In-memory demo `CrossChainDefender`. Every call succeeds deterministically.
#[derive(Default)]
pub struct DemoCrossChainDefender;

#[async_trait]
impl CrossChainDefender for DemoCrossChainDefender {
    async fn reroute_liquidity(&self, _pool_key: &str, _proof: &str) -> ProtectorResult<String> {
        Ok(format!("handle-reroute-{}", Uuid::new_v4()))
    }

    async fn block_cross_chain_arb(&self, _pool_key: &str, _proof: &str) -> ProtectorResult<String> {
        Ok(format!("handle-arbblock-{}", Uuid::new_v4()))
    }

    async fn emergency_bridge_pause(&self, _pool_key: &str, _proof: &str) -> ProtectorResult<String> {
        Ok(format!("handle-bridge-{}", Uuid::new_v4()))
    }
}
