// =============================================================================
// EmaTracker — per (pool, signal kind) adaptive threshold
// =============================================================================
//
// Unlike a classic price EMA (seeded from a simple-moving-average warm-up
// window), this tracker is driven one magnitude at a time and seeds directly
// from the first sample. The derived `threshold()` widens smoothly from
// `base` in calm markets up to `3 * base` under sustained volatility.
// =============================================================================

use tracing::trace;

/// Adaptive per-`(pool, signal kind)` threshold tracker.
#[derive(Debug, Clone)]
pub struct EmaTracker {
    ema: f64,
    samples: u64,
    base: f64,
    alpha: f64,
}

impl EmaTracker {
    /// Construct a new tracker. `base` must be positive and `alpha` must lie
    /// in `(0, 1]`; both are invariants enforced at construction per spec
    /// §4.1's "reject at construction" edge case.
    pub fn new(base: f64, alpha: f64) -> Self {
        assert!(base > 0.0, "EmaTracker base must be > 0, got {base}");
        assert!(
            alpha > 0.0 && alpha <= 1.0,
            "EmaTracker alpha must be in (0, 1], got {alpha}"
        );
        Self {
            ema: 0.0,
            samples: 0,
            base,
            alpha,
        }
    }

    /// Feed a new magnitude sample and return the post-update threshold.
    ///
    /// The first sample seeds `ema` directly (no blending); every subsequent
    /// sample blends with the running EMA. Negative magnitudes are clamped
    /// to zero.
    pub fn update(&mut self, magnitude: f64) -> f64 {
        let magnitude = magnitude.max(0.0);

        if self.samples == 0 {
            self.ema = magnitude;
        } else {
            self.ema = self.alpha * magnitude + (1.0 - self.alpha) * self.ema;
        }
        self.samples += 1;

        let threshold = self.threshold();
        trace!(magnitude, ema = self.ema, threshold, samples = self.samples, "ema updated");
        threshold
    }

    /// Current threshold: `base * (1 + 2 * clamp(ema / base, 0, 1))`.
    pub fn threshold(&self) -> f64 {
        let normalized = (self.ema / self.base).clamp(0.0, 1.0);
        self.base * (1.0 + 2.0 * normalized)
    }

    pub fn ema(&self) -> f64 {
        self.ema
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn base(&self) -> f64 {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "base must be > 0")]
    fn rejects_non_positive_base() {
        EmaTracker::new(0.0, 0.5);
    }

    #[test]
    #[should_panic(expected = "alpha must be in")]
    fn rejects_out_of_range_alpha() {
        EmaTracker::new(0.3, 0.0);
    }

    #[test]
    fn first_sample_seeds_directly() {
        let mut tracker = EmaTracker::new(0.3, 0.1);
        tracker.update(0.8);
        assert_eq!(tracker.ema(), 0.8);
    }

    #[test]
    fn second_sample_blends_with_alpha() {
        let mut tracker = EmaTracker::new(0.3, 0.5);
        tracker.update(0.2);
        tracker.update(0.8);
        // ema = 0.5*0.8 + 0.5*0.2 = 0.5
        assert!((tracker.ema() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn threshold_stays_within_base_to_3x_base() {
        let mut tracker = EmaTracker::new(0.4, 0.3);
        for m in [0.0, 0.1, 0.9, 1.0, 0.5, 0.0, 1.0] {
            let t = tracker.update(m);
            assert!(t >= tracker.base() - 1e-9);
            assert!(t <= 3.0 * tracker.base() + 1e-9);
        }
    }

    #[test]
    fn negative_magnitude_clamped_to_zero() {
        let mut tracker = EmaTracker::new(0.3, 1.0);
        tracker.update(-5.0);
        assert_eq!(tracker.ema(), 0.0);
    }

    #[test]
    fn calm_market_threshold_near_base() {
        let mut tracker = EmaTracker::new(0.3, 0.1);
        for _ in 0..50 {
            tracker.update(0.0);
        }
        assert!((tracker.threshold() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn sustained_volatility_threshold_near_3x_base() {
        let mut tracker = EmaTracker::new(0.3, 0.5);
        for _ in 0..50 {
            tracker.update(1.0);
        }
        assert!((tracker.threshold() - 0.9).abs() < 1e-6);
    }
}
