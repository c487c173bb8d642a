// =============================================================================
// Error taxonomy
// =============================================================================
//
// Adapter errors never kill the engine; only configuration errors at
// startup are fatal. The core pipeline (EMA, window, state machine,
// decision mapper, RiskEngine::ingest_signal) is infallible by contract —
// malformed input is clamped and logged, never propagated as an Err.

use std::fmt;

/// Transient failures should be retried upstream by the caller re-emitting
/// a signal; permanent ones will not resolve by retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectorErrorKind {
    Transient,
    Permanent,
}

impl fmt::Display for ProtectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtectorErrorKind::Transient => "transient",
            ProtectorErrorKind::Permanent => "permanent",
        };
        write!(f, "{s}")
    }
}

/// Errors surfaced by adapters and the core engine's boundary operations.
#[derive(Debug)]
pub enum SentinelError {
    Input(String),
    Source { source_name: String, message: String },
    Protector { kind: ProtectorErrorKind, pool_key: String, message: String },
    Config(String),
    Invariant(String),
}

impl fmt::Display for SentinelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentinelError::Input(msg) => write!(f, "input error: {msg}"),
            SentinelError::Source { source_name, message } => {
                write!(f, "source error ({source_name}): {message}")
            }
            SentinelError::Protector { kind, pool_key, message } => {
                write!(f, "protector error ({kind}) for pool {pool_key}: {message}")
            }
            SentinelError::Config(msg) => write!(f, "configuration error: {msg}"),
            SentinelError::Invariant(msg) => write!(f, "internal invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for SentinelError {}

pub type Result<T> = std::result::Result<T, SentinelError>;
