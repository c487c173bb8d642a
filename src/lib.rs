// =============================================================================
// sentinel-core — multi-agent MEV / oracle-manipulation / cross-chain
// threat detection and response engine
// =============================================================================

pub mod bus;
pub mod config;
pub mod correlation_window;
pub mod decision_mapper;
pub mod ema;
pub mod engine;
pub mod error;
pub mod executor;
pub mod protector;
pub mod risk_engine;
pub mod rpc_budget;
pub mod scout;
pub mod sources;
pub mod state_machine;
pub mod types;
pub mod validator;

pub use config::SentinelConfig;
pub use engine::SentinelEngine;
pub use error::{Result, SentinelError};
