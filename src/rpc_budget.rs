// =============================================================================
// RpcBudget — token-bucket call budget with hard-reset refill
// =============================================================================
//
// Grounded on the teacher's rate-limit tracker: lock-free snapshot reads via
// atomics, a periodic hard reset to the configured ceiling rather than an
// additive trickle refill.
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{BudgetRefill, BudgetTransition, MessageBus};

/// Coarse status derived from remaining budget, used to scale poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Normal,
    Quiet,
    Exhausted,
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BudgetStatus::Normal => "Normal",
            BudgetStatus::Quiet => "Quiet",
            BudgetStatus::Exhausted => "Exhausted",
        };
        write!(f, "{s}")
    }
}

const STATUS_NORMAL: u8 = 0;
const STATUS_QUIET: u8 = 1;
const STATUS_EXHAUSTED: u8 = 2;

fn status_code(status: BudgetStatus) -> u8 {
    match status {
        BudgetStatus::Normal => STATUS_NORMAL,
        BudgetStatus::Quiet => STATUS_QUIET,
        BudgetStatus::Exhausted => STATUS_EXHAUSTED,
    }
}

/// Token-bucket budget for outbound RPC calls, refilled by periodic hard
/// reset rather than continuous trickle. `quiet_threshold` is a fraction of
/// `max_calls` (e.g. 0.25). Status transitions and refills are published to
/// `bus.budget_quiet` / `bus.budget_exhausted` / `bus.budget_refill`.
pub struct RpcBudget {
    remaining: AtomicU32,
    max_calls: u32,
    quiet_threshold: f64,
    last_refill_ms: AtomicU64,
    refill_interval_ms: i64,
    last_status: AtomicU8,
    bus: Arc<MessageBus>,
}

impl RpcBudget {
    pub fn new(max_calls: u32, refill_interval_ms: i64, quiet_threshold: f64, now_ms: i64, bus: Arc<MessageBus>) -> Self {
        Self {
            remaining: AtomicU32::new(max_calls),
            max_calls,
            quiet_threshold,
            last_refill_ms: AtomicU64::new(now_ms as u64),
            refill_interval_ms,
            last_status: AtomicU8::new(STATUS_NORMAL),
            bus,
        }
    }

    /// Attempt to consume `n` calls from the budget. Fails (returns `false`)
    /// without side effects if fewer than `n` remain.
    pub fn try_consume(&self, n: u32) -> bool {
        loop {
            let current = self.remaining.load(Ordering::Acquire);
            if current < n {
                return false;
            }
            let next = current - n;
            if self
                .remaining
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.publish_transition();
                return true;
            }
        }
    }

    /// Publish `budget_quiet` / `budget_exhausted` the moment `status()`
    /// first enters that band; a no-op while the status is unchanged.
    fn publish_transition(&self) {
        let status = self.status();
        let code = status_code(status);
        let previous = self.last_status.swap(code, Ordering::AcqRel);
        if code == previous {
            return;
        }
        let remaining = self.remaining();
        match status {
            BudgetStatus::Quiet => {
                warn!(remaining, max_calls = self.max_calls, "rpc budget entered quiet status");
                self.bus.budget_quiet.publish(BudgetTransition { remaining, max: self.max_calls });
            }
            BudgetStatus::Exhausted => {
                warn!(remaining, max_calls = self.max_calls, "rpc budget exhausted");
                self.bus.budget_exhausted.publish(BudgetTransition { remaining, max: self.max_calls });
            }
            BudgetStatus::Normal => {
                info!(remaining, max_calls = self.max_calls, "rpc budget back to normal");
            }
        }
    }

    /// Hard-reset the remaining budget to `max_calls` if `refill_interval_ms`
    /// has elapsed since the last refill. Call periodically from a ticker.
    pub fn maybe_refill(&self, now_ms: i64) -> bool {
        let last = self.last_refill_ms.load(Ordering::Acquire) as i64;
        if now_ms - last < self.refill_interval_ms {
            return false;
        }
        if self
            .last_refill_ms
            .compare_exchange(last as u64, now_ms as u64, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.remaining.store(self.max_calls, Ordering::Release);
            self.last_status.store(STATUS_NORMAL, Ordering::Release);
            info!(max_calls = self.max_calls, "rpc budget refilled");
            self.bus.budget_refill.publish(BudgetRefill { max: self.max_calls, at_ms: now_ms });
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    /// `Exhausted` at zero remaining, `Quiet` below `quiet_threshold *
    /// max_calls`, otherwise `Normal`.
    pub fn status(&self) -> BudgetStatus {
        let remaining = self.remaining();
        if remaining == 0 {
            BudgetStatus::Exhausted
        } else if (remaining as f64) < self.quiet_threshold * self.max_calls as f64 {
            BudgetStatus::Quiet
        } else {
            BudgetStatus::Normal
        }
    }

    /// Fixed poll-interval recommendation per status: wider as the budget
    /// thins, so a refill is more likely to land before exhaustion.
    pub fn recommended_poll_interval_ms(&self) -> i64 {
        match self.status() {
            BudgetStatus::Normal => 12_000,
            BudgetStatus::Quiet => 45_000,
            BudgetStatus::Exhausted => 120_000,
        }
    }
}
