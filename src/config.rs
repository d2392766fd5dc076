//! Process configuration loading and validation
//!
//! Per-session `BotConfig` arrives from the edge at session start and lives
//! in `session::types`; this module covers the process-level knobs: cluster
//! endpoints, block-engine client, and pipeline limits.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::cluster::Cluster;

/// Main process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcEndpoints,
    #[serde(default)]
    pub block_engine: BlockEngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// HTTP and WebSocket endpoints per cluster
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpoints {
    #[serde(default = "default_mainnet_endpoint")]
    pub mainnet_endpoint: String,
    #[serde(default = "default_mainnet_ws_endpoint")]
    pub mainnet_ws_endpoint: String,
    #[serde(default = "default_devnet_endpoint")]
    pub devnet_endpoint: String,
    #[serde(default = "default_devnet_ws_endpoint")]
    pub devnet_ws_endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RpcEndpoints {
    pub fn http(&self, cluster: Cluster) -> &str {
        match cluster {
            Cluster::Mainnet => &self.mainnet_endpoint,
            Cluster::Devnet => &self.devnet_endpoint,
        }
    }

    pub fn ws(&self, cluster: Cluster) -> &str {
        match cluster {
            Cluster::Mainnet => &self.mainnet_ws_endpoint,
            Cluster::Devnet => &self.devnet_ws_endpoint,
        }
    }
}

/// Block-engine (Jito) client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlockEngineConfig {
    #[serde(default = "default_block_engine_url")]
    pub url: String,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_tip_cache_ttl_secs")]
    pub tip_cache_ttl_secs: u64,
}

impl Default for BlockEngineConfig {
    fn default() -> Self {
        Self {
            url: default_block_engine_url(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            tip_cache_ttl_secs: default_tip_cache_ttl_secs(),
        }
    }
}

/// Signal pipeline limits
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Bounded channel between the WS reader and the dispatcher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// In-flight RPCs per cluster during discovery
    #[serde(default = "default_rpc_max_inflight")]
    pub rpc_max_inflight: usize,
    /// WS reconnect backoff start
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            rpc_max_inflight: default_rpc_max_inflight(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for RpcEndpoints {
    fn default() -> Self {
        Self {
            mainnet_endpoint: default_mainnet_endpoint(),
            mainnet_ws_endpoint: default_mainnet_ws_endpoint(),
            devnet_endpoint: default_devnet_endpoint(),
            devnet_ws_endpoint: default_devnet_ws_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// Default value functions
fn default_mainnet_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_mainnet_ws_endpoint() -> String {
    std::env::var("RPC_WS_ENDPOINT").unwrap_or_else(|_| "wss://api.mainnet-beta.solana.com".into())
}

fn default_devnet_endpoint() -> String {
    "https://api.devnet.solana.com".into()
}

fn default_devnet_ws_endpoint() -> String {
    "wss://api.devnet.solana.com".into()
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_block_engine_url() -> String {
    std::env::var("JITO_BLOCK_ENGINE_URL")
        .unwrap_or_else(|_| "https://mainnet.block-engine.jito.wtf".into())
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    400
}

fn default_tip_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_channel_capacity() -> usize {
    10000
}

fn default_rpc_max_inflight() -> usize {
    2
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_ping_interval_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPERD_)
            .add_source(
                config::Environment::with_prefix("SNIPERD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        for cluster in Cluster::ALL {
            let ws = self.rpc.ws(cluster);
            url::Url::parse(ws).with_context(|| format!("Invalid WS endpoint: {}", ws))?;
            if !ws.starts_with("ws") {
                anyhow::bail!("WS endpoint must use ws:// or wss://: {}", ws);
            }
        }

        if self.pipeline.rpc_max_inflight == 0 {
            anyhow::bail!("rpc_max_inflight must be positive");
        }

        if self.pipeline.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be positive");
        }

        if self.block_engine.retry_attempts == 0 {
            anyhow::bail!("block_engine.retry_attempts must be positive");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide API keys in URLs)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    mainnet: {}
    devnet: {}
    timeout: {}ms
  Block engine:
    url: {}
    retry_attempts: {}
    tip_cache_ttl: {}s
  Pipeline:
    channel_capacity: {}
    rpc_max_inflight: {}
    reconnect: {}ms (max {} attempts)
"#,
            mask_url(&self.rpc.mainnet_endpoint),
            mask_url(&self.rpc.devnet_endpoint),
            self.rpc.timeout_ms,
            mask_url(&self.block_engine.url),
            self.block_engine.retry_attempts,
            self.block_engine.tip_cache_ttl_secs,
            self.pipeline.channel_capacity,
            self.pipeline.rpc_max_inflight,
            self.pipeline.reconnect_delay_ms,
            self.pipeline.max_reconnect_attempts,
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc: RpcEndpoints::default(),
            block_engine: BlockEngineConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
