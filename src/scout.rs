// =============================================================================
// Scout Normalizer — heterogeneous chain observations -> RawSignal stream
// =============================================================================

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ScoutConfig;
use crate::rpc_budget::RpcBudget;
use crate::sources::{FlashloanSource, GasSample, GasSource, MempoolEvent, PriceSample, PriceSource};
use crate::types::{RawSignal, SignalKind};

const WEI_PER_ETHER: f64 = 1e18;

fn large_swap_magnitude(value_wei: u128) -> f64 {
    let ether = value_wei as f64 / WEI_PER_ETHER;
    if ether <= 1.0 {
        return 0.0;
    }
    (ether.log10() / 3.0).clamp(0.0, 1.0)
}

fn gas_spike_magnitude(current_gwei: f64, ema_gwei: f64, spike_multiplier: f64) -> f64 {
    if ema_gwei <= 0.0 || spike_multiplier <= 0.0 {
        return 0.0;
    }
    (((current_gwei / ema_gwei) - 1.0) / spike_multiplier).clamp(0.0, 1.0)
}

fn price_move_magnitude(prev_price: f64, new_price: f64, configured_max: f64) -> f64 {
    if prev_price <= 0.0 || configured_max <= 0.0 {
        return 0.0;
    }
    (((new_price - prev_price) / prev_price).abs() / configured_max).clamp(0.0, 1.0)
}

/// A candidate transaction for mempool-cluster accounting: large value or
/// calldata matching a known swap selector.
fn is_cluster_candidate(event: &MempoolEvent, cluster_value_wei: u128) -> bool {
    const SWAP_SELECTORS: [[u8; 4]; 2] = [
        [0x38, 0xed, 0x17, 0x39], // swapExactTokensForTokens
        [0x7f, 0xf3, 0x6a, 0xb5], // swapExactETHForTokens
    ];
    if event.value_wei >= cluster_value_wei {
        return true;
    }
    event.calldata.len() >= 4 && SWAP_SELECTORS.iter().any(|sel| event.calldata[..4] == *sel)
}

struct GasEma {
    ema: f64,
    samples: u32,
}

struct ClusterState {
    window_start_ms: i64,
    count: u32,
    emitted_this_window: bool,
}

/// Converts heterogeneous chain observations into a single RawSignal
/// stream. Maintains its own per-chain gas EMA (independent of the Risk
/// Engine's EMA) and per-`(chain, pair)` mempool cluster accounting.
pub struct Scout {
    config: ScoutConfig,
    gas_ema: Mutex<HashMap<String, GasEma>>,
    cluster_state: Mutex<HashMap<(String, String), ClusterState>>,
    last_price: Mutex<HashMap<(String, String), PriceSample>>,
}

impl Scout {
    pub fn new(config: ScoutConfig) -> Self {
        Self {
            config,
            gas_ema: Mutex::new(HashMap::new()),
            cluster_state: Mutex::new(HashMap::new()),
            last_price: Mutex::new(HashMap::new()),
        }
    }

    /// Process one poll cycle of mempool events for `chain`, returning all
    /// signals derived from them (LargeSwap, FlashLoan, and at most one
    /// debounced MempoolCluster).
    pub async fn process_mempool_batch(
        &self,
        chain: &str,
        pair: &str,
        events: &[MempoolEvent],
        flashloan_source: &dyn FlashloanSource,
    ) -> Vec<RawSignal> {
        let mut out = Vec::new();
        let pool_key = RawSignal::derive_pool_key(chain, pair);

        for event in events {
            if let Some(min_value) = self.config.min_value_wei {
                if event.value_wei < min_value {
                    continue;
                }
            }
            if let Some(allowlist) = &self.config.to_allowlist {
                match &event.to {
                    Some(to) if allowlist.contains(to) => {}
                    _ => continue,
                }
            }

            if let Some(to) = &event.to {
                if flashloan_source
                    .is_flashloan_entrypoint(chain, to)
                    .await
                    .unwrap_or(false)
                {
                    out.push(RawSignal::new(
                        SignalKind::FlashLoan,
                        chain,
                        pair,
                        pool_key.clone(),
                        1.0,
                        event.ts_ms,
                    ));
                    continue;
                }
            }

            let magnitude = large_swap_magnitude(event.value_wei);
            if magnitude > 0.0 {
                out.push(RawSignal::new(SignalKind::LargeSwap, chain, pair, pool_key.clone(), magnitude, event.ts_ms));
            }
        }

        if let Some(cluster_signal) = self.detect_cluster(chain, pair, events, &pool_key) {
            out.push(cluster_signal);
        }

        out
    }

    fn detect_cluster(
        &self,
        chain: &str,
        pair: &str,
        events: &[MempoolEvent],
        pool_key: &str,
    ) -> Option<RawSignal> {
        if events.is_empty() {
            return None;
        }
        let cluster_value_wei = (self.config.min_value_wei.unwrap_or(0)).max(1);
        let candidates = events.iter().filter(|e| is_cluster_candidate(e, cluster_value_wei)).count() as u32;
        if candidates == 0 {
            return None;
        }

        let now_ms = events.iter().map(|e| e.ts_ms).max().unwrap_or(0);
        let key = (chain.to_string(), pair.to_string());
        let mut states = self.cluster_state.lock();
        let state = states.entry(key).or_insert_with(|| ClusterState {
            window_start_ms: now_ms,
            count: 0,
            emitted_this_window: false,
        });

        if now_ms - state.window_start_ms > self.config.cluster_window_ms {
            state.window_start_ms = now_ms;
            state.count = 0;
            state.emitted_this_window = false;
        }
        state.count += candidates;

        if state.count >= self.config.cluster_threshold && !state.emitted_this_window {
            state.emitted_this_window = true;
            let magnitude = (state.count as f64 / self.config.cluster_max as f64).min(1.0);
            debug!(chain, pair, count = state.count, magnitude, "mempool cluster detected");
            Some(RawSignal::new(
                SignalKind::MempoolCluster,
                chain,
                pair,
                pool_key.to_string(),
                magnitude,
                now_ms,
            ))
        } else {
            None
        }
    }

    /// Process one gas sample, returning a `GasSpike` signal if the spike
    /// ratio exceeds the configured multiplier threshold.
    pub fn process_gas_sample(&self, sample: &GasSample, pair: &str) -> Option<RawSignal> {
        let pool_key = RawSignal::derive_pool_key(&sample.chain, pair);
        let mut emas = self.gas_ema.lock();
        let entry = emas.entry(sample.chain.clone()).or_insert(GasEma { ema: sample.gwei_mean, samples: 0 });

        let magnitude = gas_spike_magnitude(sample.gwei_mean, entry.ema, self.config.gas_spike_multiplier);

        const ALPHA: f64 = 0.2;
        if entry.samples == 0 {
            entry.ema = sample.gwei_mean;
        } else {
            entry.ema = ALPHA * sample.gwei_mean + (1.0 - ALPHA) * entry.ema;
        }
        entry.samples += 1;

        trace!(chain = %sample.chain, gwei = sample.gwei_mean, ema = entry.ema, magnitude, "gas sample processed");

        if magnitude > 0.0 {
            Some(RawSignal::new(SignalKind::GasSpike, &sample.chain, pair, pool_key, magnitude, sample.ts_ms))
        } else {
            None
        }
    }

    /// Process one price sample against the last-seen sample for the same
    /// pair, returning a `PriceMove` signal if the tick-over-tick change
    /// exceeds the configured maximum.
    pub fn process_price_sample(&self, sample: PriceSample, configured_max: f64) -> Option<RawSignal> {
        let key = (sample.chain.clone(), sample.pair.clone());
        let pool_key = RawSignal::derive_pool_key(&sample.chain, &sample.pair);
        let mut last = self.last_price.lock();

        let signal = last.get(&key).map(|prev| {
            let magnitude = price_move_magnitude(prev.price_usd, sample.price_usd, configured_max);
            RawSignal::new(SignalKind::PriceMove, &sample.chain, &sample.pair, pool_key, magnitude, sample.ts_ms)
        });

        last.insert(key, sample);
        signal.filter(|s| s.magnitude > 0.0)
    }

    /// Guard every provider read with the shared RPC budget: skip the read
    /// entirely (producing no signal this cycle) if the budget is
    /// exhausted, and report the interval the caller should wait before
    /// polling this source again, widening as the budget thins.
    pub async fn poll_price_with_budget(
        &self,
        budget: &RpcBudget,
        source: &dyn PriceSource,
        chain: &str,
        pair: &str,
    ) -> (Option<PriceSample>, i64) {
        if !budget.try_consume(1) {
            return (None, budget.recommended_poll_interval_ms());
        }
        let sample = source.sample(chain, pair).await.ok().flatten();
        (sample, budget.recommended_poll_interval_ms())
    }
}
