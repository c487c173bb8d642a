// =============================================================================
// CorrelationWindow — per-pool bounded-time buffer of ScoredSignals
// =============================================================================

use std::collections::HashSet;

use crate::types::{ScoredSignal, SignalKind};

/// Bounded-time buffer of scored signals for a single pool. Entries older
/// than `windowMs` relative to the most recent `add()` call are evicted.
#[derive(Debug, Clone)]
pub struct CorrelationWindow {
    signals: Vec<ScoredSignal>,
    window_ms: i64,
}

impl CorrelationWindow {
    pub fn new(window_ms: i64) -> Self {
        Self {
            signals: Vec::new(),
            window_ms,
        }
    }

    /// Append `signal` (preserving insertion order for equal timestamps),
    /// then evict every entry older than `now_ms - windowMs`.
    pub fn add(&mut self, signal: ScoredSignal, now_ms: i64) {
        self.signals.push(signal);
        let cutoff = now_ms - self.window_ms;
        self.signals.retain(|s| s.timestamp_ms >= cutoff);
    }

    /// Sum of `weightedScore`s, saturating-clamped to `[0, 100]`.
    ///
    /// The sum is intentionally saturating: correlated signals piling up is
    /// exactly the pattern the engine is trying to catch, and the raw
    /// (unclamped) total is discarded rather than preserved once it crosses
    /// 100 — see spec §9 Open Question (b).
    pub fn composite_score(&self) -> f64 {
        let total: f64 = self.signals.iter().map(|s| s.weighted_score).sum();
        total.clamp(0.0, 100.0)
    }

    /// Read-only view of the window's current contents, in insertion order.
    pub fn signals(&self) -> &[ScoredSignal] {
        &self.signals
    }

    /// Number of distinct `SignalKind`s currently in the window.
    pub fn unique_kind_count(&self) -> u32 {
        self.signals
            .iter()
            .map(|s| s.source)
            .collect::<HashSet<SignalKind>>()
            .len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(kind: SignalKind, score: f64, ts: i64) -> ScoredSignal {
        ScoredSignal {
            source: kind,
            magnitude: 1.0,
            weight: 1.0,
            weighted_score: score,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn eviction_removes_signals_older_than_window() {
        let mut window = CorrelationWindow::new(1000);
        window.add(signal(SignalKind::FlashLoan, 10.0, 0), 0);
        window.add(signal(SignalKind::GasSpike, 10.0, 500), 500);
        // Now advance past the window for the first signal.
        window.add(signal(SignalKind::LargeSwap, 10.0, 1600), 1600);
        for s in window.signals() {
            assert!(s.timestamp_ms >= 1600 - 1000);
        }
    }

    #[test]
    fn composite_score_clamped_to_100() {
        let mut window = CorrelationWindow::new(10_000);
        for i in 0..5 {
            window.add(signal(SignalKind::FlashLoan, 40.0, i), 100);
        }
        assert_eq!(window.composite_score(), 100.0);
    }

    #[test]
    fn composite_score_never_negative() {
        let window = CorrelationWindow::new(10_000);
        assert_eq!(window.composite_score(), 0.0);
    }

    #[test]
    fn unique_kind_count_counts_distinct_kinds_only() {
        let mut window = CorrelationWindow::new(10_000);
        window.add(signal(SignalKind::FlashLoan, 1.0, 0), 0);
        window.add(signal(SignalKind::FlashLoan, 1.0, 1), 1);
        window.add(signal(SignalKind::GasSpike, 1.0, 2), 2);
        assert_eq!(window.unique_kind_count(), 2);
    }

    #[test]
    fn insertion_order_preserved_for_equal_timestamps() {
        let mut window = CorrelationWindow::new(10_000);
        window.add(signal(SignalKind::FlashLoan, 1.0, 5), 5);
        window.add(signal(SignalKind::GasSpike, 2.0, 5), 5);
        let kinds: Vec<_> = window.signals().iter().map(|s| s.source).collect();
        assert_eq!(kinds, vec![SignalKind::FlashLoan, SignalKind::GasSpike]);
    }
}
