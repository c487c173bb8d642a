// =============================================================================
// Shared data model — signals, decisions, and pool state
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of observation a signal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    FlashLoan,
    GasSpike,
    LargeSwap,
    PriceMove,
    MempoolCluster,
    CrossChainAttack,
    OracleManipulation,
    CrossChainInconsistency,
}

impl SignalKind {
    /// All variants, in a stable order. Used to seed weight/threshold maps.
    pub const ALL: [SignalKind; 8] = [
        SignalKind::FlashLoan,
        SignalKind::GasSpike,
        SignalKind::LargeSwap,
        SignalKind::PriceMove,
        SignalKind::MempoolCluster,
        SignalKind::CrossChainAttack,
        SignalKind::OracleManipulation,
        SignalKind::CrossChainInconsistency,
    ];

    /// `{FlashLoan, GasSpike, LargeSwap, MempoolCluster}` — front-running /
    /// sandwich-style MEV signatures.
    pub fn is_mev(self) -> bool {
        matches!(
            self,
            SignalKind::FlashLoan
                | SignalKind::GasSpike
                | SignalKind::LargeSwap
                | SignalKind::MempoolCluster
        )
    }

    /// `{OracleManipulation, CrossChainInconsistency}`.
    pub fn is_oracle(self) -> bool {
        matches!(
            self,
            SignalKind::OracleManipulation | SignalKind::CrossChainInconsistency
        )
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalKind::FlashLoan => "FlashLoan",
            SignalKind::GasSpike => "GasSpike",
            SignalKind::LargeSwap => "LargeSwap",
            SignalKind::PriceMove => "PriceMove",
            SignalKind::MempoolCluster => "MempoolCluster",
            SignalKind::CrossChainAttack => "CrossChainAttack",
            SignalKind::OracleManipulation => "OracleManipulation",
            SignalKind::CrossChainInconsistency => "CrossChainInconsistency",
        };
        write!(f, "{s}")
    }
}

/// A raw observation produced by the Scout normalizer or the Validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub kind: SignalKind,
    pub chain: String,
    pub pair: String,
    pub pool_key: String,
    pub magnitude: f64,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub evidence: HashMap<String, serde_json::Value>,
}

impl RawSignal {
    /// Construct a signal, clamping `magnitude` into `[0, 1]` and rejecting
    /// NaN per the ingress invariant in spec §3.
    pub fn new(
        kind: SignalKind,
        chain: impl Into<String>,
        pair: impl Into<String>,
        pool_key: impl Into<String>,
        magnitude: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            kind,
            chain: chain.into(),
            pair: pair.into(),
            pool_key: pool_key.into(),
            magnitude: clamp_magnitude(magnitude),
            timestamp_ms,
            evidence: HashMap::new(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    /// Derive the canonical pool key for a chain/pair pair when no explicit
    /// pool address is known: `chain + ":" + pair`.
    pub fn derive_pool_key(chain: &str, pair: &str) -> String {
        format!("{chain}:{pair}")
    }
}

/// Clamp a raw magnitude into `[0, 1]`, mapping NaN to `0.0`.
pub fn clamp_magnitude(magnitude: f64) -> f64 {
    if magnitude.is_nan() {
        0.0
    } else {
        magnitude.clamp(0.0, 1.0)
    }
}

/// A signal after it has passed through the Risk Engine's scoring pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub source: SignalKind,
    pub magnitude: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub timestamp_ms: i64,
}

/// The qualitative threat level of a pool, ordered `Watch < Elevated <
/// Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatTier {
    Watch,
    Elevated,
    Critical,
}

impl ThreatTier {
    /// Executor priority: `Critical = 3, Elevated = 2, Watch = 1`.
    pub fn priority(self) -> u8 {
        match self {
            ThreatTier::Watch => 1,
            ThreatTier::Elevated => 2,
            ThreatTier::Critical => 3,
        }
    }
}

impl std::fmt::Display for ThreatTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreatTier::Watch => "Watch",
            ThreatTier::Elevated => "Elevated",
            ThreatTier::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

/// A concrete defensive action to apply to a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DefenseAction {
    MevProtection { fee_bps: u32 },
    OracleValidation,
    CircuitBreaker { reason: String },
    LiquidityReroute,
    CrossChainArbBlock,
    EmergencyBridge,
}

impl DefenseAction {
    /// Short machine-readable name, used for TTL lookup and logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DefenseAction::MevProtection { .. } => "MevProtection",
            DefenseAction::OracleValidation => "OracleValidation",
            DefenseAction::CircuitBreaker { .. } => "CircuitBreaker",
            DefenseAction::LiquidityReroute => "LiquidityReroute",
            DefenseAction::CrossChainArbBlock => "CrossChainArbBlock",
            DefenseAction::EmergencyBridge => "EmergencyBridge",
        }
    }

    /// Cross-chain variants are opaque to the Executor beyond TTL handling.
    pub fn is_cross_chain(&self) -> bool {
        matches!(
            self,
            DefenseAction::LiquidityReroute
                | DefenseAction::CrossChainArbBlock
                | DefenseAction::EmergencyBridge
        )
    }
}

impl std::fmt::Display for DefenseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefenseAction::MevProtection { fee_bps } => write!(f, "MevProtection({fee_bps}bps)"),
            DefenseAction::CircuitBreaker { reason } => write!(f, "CircuitBreaker({reason})"),
            other => write!(f, "{}", other.kind_name()),
        }
    }
}

/// A bounded-lifetime order to apply exactly one defense action to a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub id: String,
    pub pool_key: String,
    pub chain: String,
    pub pair: String,
    pub tier: ThreatTier,
    pub composite_score: f64,
    pub action: DefenseAction,
    pub rationale: String,
    pub contributing_signals: Vec<ScoredSignal>,
    pub timestamp_ms: i64,
    pub ttl_ms: u64,
}

impl RiskDecision {
    pub fn expires_at_ms(&self) -> i64 {
        self.timestamp_ms + self.ttl_ms as i64
    }
}

/// A currently-active protection managed by the Executor scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveProtection {
    pub pool_key: String,
    pub chain: String,
    /// `None` represents "recently expired" per spec §3.
    pub action: Option<DefenseAction>,
    pub activated_at_ms: i64,
    pub expires_at_ms: i64,
    pub external_handle: Option<String>,
}

impl ActiveProtection {
    pub fn is_active(&self) -> bool {
        self.action.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_magnitude_handles_out_of_range_and_nan() {
        assert_eq!(clamp_magnitude(-1.0), 0.0);
        assert_eq!(clamp_magnitude(2.0), 1.0);
        assert_eq!(clamp_magnitude(0.5), 0.5);
        assert_eq!(clamp_magnitude(f64::NAN), 0.0);
    }

    #[test]
    fn derive_pool_key_joins_chain_and_pair() {
        assert_eq!(
            RawSignal::derive_pool_key("ethereum", "ETH/USDC"),
            "ethereum:ETH/USDC"
        );
    }

    #[test]
    fn tier_ordering_is_watch_lt_elevated_lt_critical() {
        assert!(ThreatTier::Watch < ThreatTier::Elevated);
        assert!(ThreatTier::Elevated < ThreatTier::Critical);
    }

    #[test]
    fn signal_kind_classification() {
        assert!(SignalKind::FlashLoan.is_mev());
        assert!(SignalKind::MempoolCluster.is_mev());
        assert!(!SignalKind::PriceMove.is_mev());
        assert!(SignalKind::OracleManipulation.is_oracle());
        assert!(SignalKind::CrossChainInconsistency.is_oracle());
        assert!(!SignalKind::GasSpike.is_oracle());
    }
}
