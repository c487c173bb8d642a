// =============================================================================
// Configuration — every field carries a default; persistence is atomic
// =============================================================================
//
// Every tunable used by the Risk Engine, Scout, Validator, and Executor
// lives here so the whole system can be constructed from one structured
// document. All fields carry `#[serde(default)]` so older config files
// missing newer fields still deserialize. Persistence uses an atomic
// tmp + rename write to avoid corruption on crash.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state_machine::HysteresisBand;
use crate::types::SignalKind;

fn default_correlation_window_ms() -> i64 {
    24_000
}

fn default_ema_alpha() -> f64 {
    0.1
}

// CrossChainAttack has no entry here: it is never scored through the
// EMA/threshold pipeline (Validator never emits it as a RawSignal), only
// matched directly by the decision mapper's cross-chain rules. A pool that
// somehow receives one falls back to `ingest_signal`'s generic defaults.
fn default_base_thresholds() -> HashMap<SignalKind, f64> {
    use SignalKind::*;
    HashMap::from([
        (FlashLoan, 0.30),
        (GasSpike, 0.40),
        (LargeSwap, 0.35),
        (PriceMove, 0.25),
        (MempoolCluster, 0.20),
        (OracleManipulation, 0.05),
        (CrossChainInconsistency, 0.08),
    ])
}

fn default_raw_weights() -> HashMap<SignalKind, f64> {
    use SignalKind::*;
    HashMap::from([
        (FlashLoan, 2.5),
        (GasSpike, 1.5),
        (LargeSwap, 2.0),
        (PriceMove, 1.0),
        (MempoolCluster, 3.0),
        (OracleManipulation, 3.5),
        (CrossChainInconsistency, 2.8),
    ])
}

fn default_watch_to_elevated() -> (f64, f64) {
    (35.0, 20.0)
}

fn default_elevated_to_critical() -> (f64, f64) {
    (70.0, 50.0)
}

/// Action TTLs in milliseconds, keyed by `DefenseAction::kind_name()`.
fn default_action_ttl_ms() -> HashMap<String, u64> {
    HashMap::from([
        ("MevProtection".to_string(), 12_000),
        ("OracleValidation".to_string(), 60_000),
        ("CircuitBreaker".to_string(), 300_000),
        ("LiquidityReroute".to_string(), 600_000),
        ("CrossChainArbBlock".to_string(), 120_000),
        ("EmergencyBridge".to_string(), 900_000),
    ])
}

/// `RiskEngine` tuning, per spec §4.6 defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEngineConfig {
    #[serde(default = "default_correlation_window_ms")]
    pub correlation_window_ms: i64,

    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    #[serde(default = "default_base_thresholds")]
    pub base_thresholds: HashMap<SignalKind, f64>,

    #[serde(default = "default_raw_weights")]
    pub raw_weights: HashMap<SignalKind, f64>,

    #[serde(default = "default_watch_to_elevated")]
    pub watch_to_elevated: (f64, f64),

    #[serde(default = "default_elevated_to_critical")]
    pub elevated_to_critical: (f64, f64),

    #[serde(default = "default_action_ttl_ms")]
    pub action_ttl_ms: HashMap<String, u64>,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            correlation_window_ms: default_correlation_window_ms(),
            ema_alpha: default_ema_alpha(),
            base_thresholds: default_base_thresholds(),
            raw_weights: default_raw_weights(),
            watch_to_elevated: default_watch_to_elevated(),
            elevated_to_critical: default_elevated_to_critical(),
            action_ttl_ms: default_action_ttl_ms(),
        }
    }
}

impl RiskEngineConfig {
    pub fn watch_to_elevated_band(&self) -> HysteresisBand {
        HysteresisBand::new(self.watch_to_elevated.0, self.watch_to_elevated.1)
    }

    pub fn elevated_to_critical_band(&self) -> HysteresisBand {
        HysteresisBand::new(self.elevated_to_critical.0, self.elevated_to_critical.1)
    }
}

fn default_max_calls() -> u32 {
    600
}

fn default_refill_interval_ms() -> i64 {
    60_000
}

fn default_quiet_threshold_frac() -> f64 {
    0.25
}

/// `RpcBudget` tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcBudgetConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: i64,
    #[serde(default = "default_quiet_threshold_frac")]
    pub quiet_threshold_frac: f64,
}

impl Default for RpcBudgetConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            refill_interval_ms: default_refill_interval_ms(),
            quiet_threshold_frac: default_quiet_threshold_frac(),
        }
    }
}

fn default_cluster_window_ms() -> i64 {
    24_000
}

fn default_cluster_threshold() -> u32 {
    3
}

fn default_cluster_max() -> u32 {
    10
}

fn default_gas_spike_multiplier() -> f64 {
    2.0
}

/// Scout normalizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub min_value_wei: Option<u128>,
    #[serde(default)]
    pub to_allowlist: Option<Vec<String>>,
    #[serde(default = "default_cluster_window_ms")]
    pub cluster_window_ms: i64,
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: u32,
    #[serde(default = "default_cluster_max")]
    pub cluster_max: u32,
    #[serde(default = "default_gas_spike_multiplier")]
    pub gas_spike_multiplier: f64,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            min_value_wei: None,
            to_allowlist: None,
            cluster_window_ms: default_cluster_window_ms(),
            cluster_threshold: default_cluster_threshold(),
            cluster_max: default_cluster_max(),
            gas_spike_multiplier: default_gas_spike_multiplier(),
        }
    }
}

fn default_stale_threshold_sec() -> i64 {
    3_600
}

fn default_min_oracles_required() -> u32 {
    1
}

fn default_oracle_deviation_threshold_pct() -> f64 {
    5.0
}

fn default_cross_chain_deviation_bps() -> f64 {
    100.0
}

fn default_price_age_threshold_ms() -> i64 {
    60_000
}

fn default_min_chains_required() -> u32 {
    2
}

/// Validator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_stale_threshold_sec")]
    pub stale_threshold_sec: i64,
    #[serde(default = "default_min_oracles_required")]
    pub min_oracles_required: u32,
    #[serde(default = "default_oracle_deviation_threshold_pct")]
    pub oracle_deviation_threshold_pct: f64,
    #[serde(default = "default_cross_chain_deviation_bps")]
    pub cross_chain_deviation_bps: f64,
    #[serde(default = "default_price_age_threshold_ms")]
    pub price_age_threshold_ms: i64,
    #[serde(default = "default_min_chains_required")]
    pub min_chains_required: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold_sec: default_stale_threshold_sec(),
            min_oracles_required: default_min_oracles_required(),
            oracle_deviation_threshold_pct: default_oracle_deviation_threshold_pct(),
            cross_chain_deviation_bps: default_cross_chain_deviation_bps(),
            price_age_threshold_ms: default_price_age_threshold_ms(),
            min_chains_required: default_min_chains_required(),
        }
    }
}

fn default_decision_debounce_ms() -> i64 {
    200
}

fn default_monitor_interval_ms() -> i64 {
    12_000
}

/// Executor scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_decision_debounce_ms")]
    pub decision_debounce_ms: i64,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            decision_debounce_ms: default_decision_debounce_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

/// Top-level configuration for the whole engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub risk_engine: RiskEngineConfig,
    #[serde(default)]
    pub rpc_budget: RpcBudgetConfig,
    #[serde(default)]
    pub scout: ScoutConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl SentinelConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// their defaults; a missing file is an error so callers can decide
    /// whether to fall back to `SentinelConfig::default()`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        info!(path = %path.display(), "sentinel config loaded");
        Ok(config)
    }

    /// Persist the configuration atomically (write to a `.tmp` sibling,
    /// then rename) so a crash mid-write never corrupts the config file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "sentinel config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.risk_engine.correlation_window_ms, 24_000);
        assert_eq!(cfg.risk_engine.ema_alpha, 0.1);
        assert_eq!(cfg.risk_engine.base_thresholds[&SignalKind::FlashLoan], 0.30);
        assert_eq!(cfg.risk_engine.raw_weights[&SignalKind::MempoolCluster], 3.0);
        assert_eq!(cfg.risk_engine.watch_to_elevated, (35.0, 20.0));
        assert_eq!(cfg.risk_engine.elevated_to_critical, (70.0, 50.0));
        assert_eq!(cfg.rpc_budget.max_calls, 600);
        assert_eq!(cfg.executor.decision_debounce_ms, 200);
        assert_eq!(cfg.executor.monitor_interval_ms, 12_000);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: SentinelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.risk_engine.ema_alpha, 0.1);
        assert_eq!(cfg.validator.min_oracles_required, 1);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = SentinelConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: SentinelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.risk_engine.correlation_window_ms, cfg2.risk_engine.correlation_window_ms);
        assert_eq!(cfg.rpc_budget.max_calls, cfg2.rpc_budget.max_calls);
    }

    #[test]
    fn save_then_load_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("sentinel-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let cfg = SentinelConfig::default();
        cfg.save(&path).unwrap();
        let loaded = SentinelConfig::load(&path).unwrap();
        assert_eq!(loaded.risk_engine.ema_alpha, cfg.risk_engine.ema_alpha);

        std::fs::remove_dir_all(&dir).ok();
    }
}
