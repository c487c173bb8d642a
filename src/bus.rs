// =============================================================================
// Message Bus — in-process typed topics with drop-oldest backpressure
// =============================================================================
//
// Built on `tokio::sync::broadcast`: many producers and subscribers, a
// bounded per-topic queue, and oldest-dropped overflow exposed as a lag
// counter. Slow subscribers never block producers.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use crate::risk_engine::DecisionCleared;
use crate::types::{DefenseAction, RawSignal, RiskDecision};

const DEFAULT_CAPACITY: usize = 1024;

/// A successful on-chain execution of a decision.
#[derive(Debug, Clone)]
pub struct ExecutionSuccess {
    pub decision_id: String,
    pub pool_key: String,
    pub external_handle: String,
}

/// A failed attempt to execute a decision.
#[derive(Debug, Clone)]
pub struct ExecutionFailed {
    pub decision_id: String,
    pub pool_key: String,
    pub error: String,
}

/// Advisory broadcast for Elevated-tier, non-cross-chain decisions.
#[derive(Debug, Clone)]
pub struct ThreatBroadcast {
    pub pool_key: String,
    pub score: f64,
    pub action: DefenseAction,
}

/// A previously-active protection whose TTL has expired.
#[derive(Debug, Clone)]
pub struct ProtectionExpired {
    pub pool_key: String,
    pub chain: String,
    pub expired_at_ms: i64,
}

/// An `RpcBudget` entering `Quiet` or `Exhausted` status.
#[derive(Debug, Clone, Copy)]
pub struct BudgetTransition {
    pub remaining: u32,
    pub max: u32,
}

/// An `RpcBudget` hard-reset refill.
#[derive(Debug, Clone, Copy)]
pub struct BudgetRefill {
    pub max: u32,
    pub at_ms: i64,
}

/// Per-topic message/drop counters, snapshot via `BusStats`.
struct TopicCounters {
    messages: AtomicU64,
    drops: AtomicU64,
}

impl TopicCounters {
    fn new() -> Self {
        Self { messages: AtomicU64::new(0), drops: AtomicU64::new(0) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicStats {
    pub messages: u64,
    pub drops: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BusStats {
    pub signal: TopicStats,
    pub decision: TopicStats,
    pub decision_cleared: TopicStats,
    pub threat_broadcast: TopicStats,
    pub execution_success: TopicStats,
    pub execution_failed: TopicStats,
    pub protection_expired: TopicStats,
    pub budget_quiet: TopicStats,
    pub budget_exhausted: TopicStats,
    pub budget_refill: TopicStats,
}

macro_rules! topic {
    ($name:ident, $ty:ty) => {
        pub struct $name {
            tx: broadcast::Sender<$ty>,
            counters: TopicCounters,
        }

        impl $name {
            fn new(capacity: usize) -> Self {
                let (tx, _rx) = broadcast::channel(capacity);
                Self { tx, counters: TopicCounters::new() }
            }

            pub fn subscribe(&self) -> broadcast::Receiver<$ty> {
                self.tx.subscribe()
            }

            pub fn publish(&self, value: $ty) {
                self.counters.messages.fetch_add(1, Ordering::Relaxed);
                // `send` errors only when there are zero subscribers, which is
                // not a drop in the backpressure sense — only a full
                // subscriber queue counts as a drop, and broadcast handles
                // that per-receiver via `RecvError::Lagged` on the reader
                // side, which is where we attribute it.
                let _ = self.tx.send(value);
            }

            fn stats(&self) -> TopicStats {
                TopicStats {
                    messages: self.counters.messages.load(Ordering::Relaxed),
                    drops: self.counters.drops.load(Ordering::Relaxed),
                }
            }

            /// Record that a subscriber lagged and dropped messages, per
            /// `broadcast::error::RecvError::Lagged(n)` observed by a reader.
            pub fn record_drop(&self, n: u64) {
                self.counters.drops.fetch_add(n, Ordering::Relaxed);
                warn!(dropped = n, "bus subscriber lagged, oldest messages dropped");
            }
        }
    };
}

topic!(SignalTopic, RawSignal);
topic!(DecisionTopic, RiskDecision);
topic!(DecisionClearedTopic, DecisionCleared);
topic!(ThreatBroadcastTopic, ThreatBroadcast);
topic!(ExecutionSuccessTopic, ExecutionSuccess);
topic!(ExecutionFailedTopic, ExecutionFailed);
topic!(ProtectionExpiredTopic, ProtectionExpired);
topic!(BudgetQuietTopic, BudgetTransition);
topic!(BudgetExhaustedTopic, BudgetTransition);
topic!(BudgetRefillTopic, BudgetRefill);

/// The in-process message bus wiring every typed topic together.
pub struct MessageBus {
    pub signal: SignalTopic,
    pub decision: DecisionTopic,
    pub decision_cleared: DecisionClearedTopic,
    pub threat_broadcast: ThreatBroadcastTopic,
    pub execution_success: ExecutionSuccessTopic,
    pub execution_failed: ExecutionFailedTopic,
    pub protection_expired: ProtectionExpiredTopic,
    pub budget_quiet: BudgetQuietTopic,
    pub budget_exhausted: BudgetExhaustedTopic,
    pub budget_refill: BudgetRefillTopic,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            signal: SignalTopic::new(capacity),
            decision: DecisionTopic::new(capacity),
            decision_cleared: DecisionClearedTopic::new(capacity),
            threat_broadcast: ThreatBroadcastTopic::new(capacity),
            execution_success: ExecutionSuccessTopic::new(capacity),
            execution_failed: ExecutionFailedTopic::new(capacity),
            protection_expired: ProtectionExpiredTopic::new(capacity),
            budget_quiet: BudgetQuietTopic::new(capacity),
            budget_exhausted: BudgetExhaustedTopic::new(capacity),
            budget_refill: BudgetRefillTopic::new(capacity),
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            signal: self.signal.stats(),
            decision: self.decision.stats(),
            decision_cleared: self.decision_cleared.stats(),
            threat_broadcast: self.threat_broadcast.stats(),
            execution_success: self.execution_success.stats(),
            execution_failed: self.execution_failed.stats(),
            protection_expired: self.protection_expired.stats(),
            budget_quiet: self.budget_quiet.stats(),
            budget_exhausted: self.budget_exhausted.stats(),
            budget_refill: self.budget_refill.stats(),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignalKind};

    fn signal() -> RawSignal {
        RawSignal::new(SignalKind::FlashLoan, "ethereum", "ETH/USDC", "pool-1", 1.0, 0)
    }

    #[tokio::test]
    async fn subscriber_receives_published_signal() {
        let bus = MessageBus::new();
        let mut rx = bus.signal.subscribe();
        bus.signal.publish(signal());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.pool_key, "pool-1");
        assert_eq!(bus.stats().signal.messages, 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_their_own_copy() {
        let bus = MessageBus::new();
        let mut rx1 = bus.signal.subscribe();
        let mut rx2 = bus.signal.subscribe();
        bus.signal.publish(signal());
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn lag_is_recorded_as_a_drop() {
        let bus = MessageBus::with_capacity(2);
        let mut rx = bus.signal.subscribe();
        for _ in 0..5 {
            bus.signal.publish(signal());
        }
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => bus.signal.record_drop(n),
            _ => panic!("expected a lag error given the small capacity"),
        }
        assert!(bus.stats().signal.drops > 0);
    }
}
