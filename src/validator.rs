// =============================================================================
// Validator — oracle reconciliation + cross-chain price consistency
// =============================================================================

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::sources::{ChainlinkFeed, OracleSource, PythFeed};
use crate::types::{RawSignal, SignalKind};

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn deviation_pct(oracle: f64, dex: f64) -> f64 {
    let denom = (oracle + dex) / 2.0;
    if denom == 0.0 {
        return 0.0;
    }
    ((oracle - dex) / denom).abs() * 100.0
}

struct ChainPriceEntry {
    price: f64,
    ts_ms: i64,
}

/// Reconciles DEX prices against external oracle feeds and across chains.
pub struct Validator {
    config: ValidatorConfig,
    last_chain_prices: Mutex<HashMap<String, HashMap<String, ChainPriceEntry>>>,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            last_chain_prices: Mutex::new(HashMap::new()),
        }
    }

    /// Run the per-pair oracle check: fetch Chainlink + Pyth feeds, compute
    /// the median non-stale consensus price, and compare against the
    /// observed DEX price.
    pub async fn check_oracle(
        &self,
        chain: &str,
        pair: &str,
        dex_price: f64,
        now_ms: i64,
        source: &dyn OracleSource,
    ) -> Option<RawSignal> {
        let pool_key = RawSignal::derive_pool_key(chain, pair);
        let stale_threshold_ms = self.config.stale_threshold_sec * 1000;

        let chainlink = source.chainlink(chain, pair).await.ok().flatten();
        let pyth = source.pyth(chain, pair).await.ok().flatten();

        let mut prices = Vec::new();
        if let Some(feed) = &chainlink {
            if now_ms - feed.updated_at_ms <= stale_threshold_ms {
                prices.push(chainlink_price(feed));
            }
        }
        if let Some(feed) = &pyth {
            if now_ms - feed.publish_time_ms <= stale_threshold_ms {
                prices.push(pyth_price(feed));
            }
        }

        if (prices.len() as u32) < self.config.min_oracles_required {
            debug!(chain, pair, non_stale = prices.len(), "insufficient non-stale oracle feeds, skipping");
            return None;
        }

        let consensus = median(prices)?;
        let deviation = deviation_pct(consensus, dex_price);

        if deviation > self.config.oracle_deviation_threshold_pct {
            let magnitude = (deviation / 100.0).min(1.0);
            debug!(chain, pair, consensus, dex_price, deviation, "oracle deviation detected");
            Some(RawSignal::new(SignalKind::OracleManipulation, chain, pair, pool_key, magnitude, now_ms))
        } else {
            None
        }
    }

    /// Record a per-chain price observation and check cross-chain spread
    /// for `pair` once enough non-stale chains are present.
    pub fn check_cross_chain(&self, chain: &str, pair: &str, price: f64, now_ms: i64) -> Option<RawSignal> {
        let pool_key = RawSignal::derive_pool_key(chain, pair);
        let mut chains = self.last_chain_prices.lock();
        let entry = chains.entry(pair.to_string()).or_default();
        entry.insert(chain.to_string(), ChainPriceEntry { price, ts_ms: now_ms });

        entry.retain(|_, e| now_ms - e.ts_ms <= self.config.price_age_threshold_ms);

        if (entry.len() as u32) < self.config.min_chains_required {
            return None;
        }

        let prices: Vec<f64> = entry.values().map(|e| e.price).collect();
        let max = prices.iter().cloned().fold(f64::MIN, f64::max);
        let min = prices.iter().cloned().fold(f64::MAX, f64::min);
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        if mean == 0.0 {
            return None;
        }
        let spread_bps = (max - min) / mean * 10_000.0;

        if spread_bps > self.config.cross_chain_deviation_bps {
            let magnitude = (spread_bps / 10_000.0).min(1.0);
            debug!(pair, spread_bps, "cross-chain price inconsistency detected");
            Some(RawSignal::new(SignalKind::CrossChainInconsistency, chain, pair, pool_key, magnitude, now_ms))
        } else {
            None
        }
    }
}

fn chainlink_price(feed: &ChainlinkFeed) -> f64 {
    feed.price / 10f64.powi(feed.decimals as i32)
}

fn pyth_price(feed: &PythFeed) -> f64 {
    feed.price * 10f64.powi(feed.expo)
}
