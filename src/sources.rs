// =============================================================================
// Abstract external collaborators — input sources
// =============================================================================
//
// Scout and Validator consume these traits; the on-chain/RPC binding that
// implements them is an external collaborator outside this crate's scope.
// Each demo implementation here is an in-memory fixture, not a production
// blockchain adapter.
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A pending mempool transaction observed on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEvent {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value_wei: u128,
    pub gas_price_wei: u128,
    pub calldata: Vec<u8>,
    pub chain: String,
    pub ts_ms: i64,
}

/// A lazily-pulled stream of pending-transaction events for one chain.
#[async_trait]
pub trait MempoolSource: Send + Sync {
    /// Pull the next batch of pending transactions observed since the last
    /// call. Returns an empty vector if none are available; never blocks
    /// indefinitely.
    async fn poll(&self) -> anyhow::Result<Vec<MempoolEvent>>;
}

/// A periodic DEX price sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub chain: String,
    pub pair: String,
    pub price_usd: f64,
    pub ts_ms: i64,
    pub source: String,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn sample(&self, chain: &str, pair: &str) -> anyhow::Result<Option<PriceSample>>;
}

/// A periodic gas-price sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasSample {
    pub chain: String,
    pub gwei_mean: f64,
    pub ts_ms: i64,
}

#[async_trait]
pub trait GasSource: Send + Sync {
    async fn sample(&self, chain: &str) -> anyhow::Result<Option<GasSample>>;
}

#[async_trait]
pub trait FlashloanSource: Send + Sync {
    /// True if `to` matches a configured flash-loan entry-point address.
    async fn is_flashloan_entrypoint(&self, chain: &str, to: &str) -> anyhow::Result<bool>;
}

/// A Chainlink-style oracle feed reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainlinkFeed {
    pub price: f64,
    pub decimals: u8,
    pub updated_at_ms: i64,
}

/// A Pyth-style oracle feed reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythFeed {
    pub price: f64,
    pub confidence: f64,
    pub publish_time_ms: i64,
    pub expo: i32,
}

#[async_trait]
pub trait OracleSource: Send + Sync {
    async fn chainlink(&self, chain: &str, pair: &str) -> anyhow::Result<Option<ChainlinkFeed>>;
    async fn pyth(&self, chain: &str, pair: &str) -> anyhow::Result<Option<PythFeed>>;
}

// ---------------------------------------------------------------------------
// Deterministic in-memory demo implementations
// ---------------------------------------------------------------------------

/// Replays a fixed queue of mempool events, one batch per `poll()` call.
/// Used by the demo binary and tests; not a production mempool adapter.
pub struct DemoMempoolSource {
    batches: parking_lot::Mutex<std::collections::VecDeque<Vec<MempoolEvent>>>,
}

impl DemoMempoolSource {
    pub fn new(batches: Vec<Vec<MempoolEvent>>) -> Self {
        Self {
            batches: parking_lot::Mutex::new(batches.into()),
        }
    }
}

#[async_trait]
impl MempoolSource for DemoMempoolSource {
    async fn poll(&self) -> anyhow::Result<Vec<MempoolEvent>> {
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }
}

/// Replays a fixed queue of price samples keyed by `(chain, pair)`.
pub struct DemoPriceSource {
    samples: parking_lot::Mutex<std::collections::HashMap<(String, String), std::collections::VecDeque<PriceSample>>>,
}

impl DemoPriceSource {
    pub fn new() -> Self {
        Self {
            samples: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn push(&self, chain: &str, pair: &str, sample: PriceSample) {
        self.samples
            .lock()
            .entry((chain.to_string(), pair.to_string()))
            .or_default()
            .push_back(sample);
    }
}

impl Default for DemoPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for DemoPriceSource {
    async fn sample(&self, chain: &str, pair: &str) -> anyhow::Result<Option<PriceSample>> {
        Ok(self
            .samples
            .lock()
            .get_mut(&(chain.to_string(), pair.to_string()))
            .and_then(|q| q.pop_front()))
    }
}
