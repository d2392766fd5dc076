//! Cluster tags
//!
//! The backend keeps an independent runtime per cluster. Bundle submission
//! is mainnet-only; devnet sessions can still detect and materialize.

use serde::{Deserialize, Serialize};

/// Solana cluster a session runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    Mainnet,
    Devnet,
}

impl Cluster {
    /// All clusters the backend manages
    pub const ALL: [Cluster; 2] = [Cluster::Mainnet, Cluster::Devnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Mainnet => "mainnet",
            Cluster::Devnet => "devnet",
        }
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Cluster {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Cluster::Mainnet),
            "devnet" => Ok(Cluster::Devnet),
            other => Err(crate::error::Error::Config(format!(
                "Unknown cluster: {}",
                other
            ))),
        }
    }
}
