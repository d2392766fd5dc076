//! Program-log streaming: one multiplexed WebSocket per cluster
//!
//! The multiplexer subscribes to log notifications for the watched programs,
//! deduplicates signatures, applies the cheap text heuristics and hands
//! qualifying signals to the per-cluster dispatcher.

pub mod dedup;
pub mod heuristics;
pub mod multiplexer;

use serde::Serialize;

/// Raydium AMM v4 program ID
/// WARNING: this may change if Raydium deploys a new program version
pub const RAYDIUM_AMM_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

/// Pump.fun bonding-curve launchpad program ID
/// WARNING: this may change if pump.fun deploys a new program version
pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Log-subscription topic, one per watched program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Raydium,
    Pumpfun,
}

impl SignalSource {
    pub fn program_id(&self) -> &'static str {
        match self {
            SignalSource::Raydium => RAYDIUM_AMM_PROGRAM_ID,
            SignalSource::Pumpfun => PUMPFUN_PROGRAM_ID,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Raydium => "raydium",
            SignalSource::Pumpfun => "pumpfun",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deduplicated, heuristic-qualified log notification
#[derive(Debug, Clone)]
pub struct RawSignal {
    pub source: SignalSource,
    pub signature: String,
    pub logs: Vec<String>,
}
