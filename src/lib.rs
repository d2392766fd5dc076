//! Keyless Multi-Tenant Sniper Backend
//!
//! Watches Solana program logs for launchpad and AMM opportunities and
//! stages at-most-one unsigned "sign and bundle" action per wallet session.
//! The browser wallet signs locally; the backend simulates and submits the
//! signed bundle to an MEV-protection block engine. No private key ever
//! reaches this process.
//!
//! # WARNING
//! - Most launchpad tokens go to zero (rug pulls, abandonment).
//! - MEV competition means other bundles may outbid yours.
//! - Devnet behavior does NOT predict mainnet behavior; bundle submission
//!   is mainnet-only.

pub mod adapters;
pub mod bundle;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logs;
pub mod materializer;
pub mod router;
pub mod service;
pub mod session;
pub mod stream;
pub mod viz;
pub mod volume;

// Re-export commonly used types
pub use cluster::Cluster;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use service::Backend;
pub use session::{BotConfig, SessionView};
