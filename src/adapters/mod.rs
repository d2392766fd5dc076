//! External adapter interfaces
//!
//! The core consumes venues, RPC nodes and the block engine through these
//! traits so the pipeline can be exercised with mocks. Production
//! implementations live alongside (`rpc`, `swap`) or in `bundle::block_engine`;
//! the aggregator and trade-local builders are deployment-specific and are
//! only specified here.

pub mod http_venues;
pub mod rpc;
pub mod swap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::Result;

/// Commitment levels used by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// Raw account contents as returned by the node
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub owner: String,
    pub data: Vec<u8>,
    pub lamports: u64,
}

/// The slice of a fetched transaction the pipeline inspects
#[derive(Debug, Clone, Default)]
pub struct FetchedTransaction {
    /// Static account keys in message order; index 0 is the fee payer
    pub account_keys: Vec<String>,
    /// Mints mentioned in preTokenBalances
    pub pre_token_mints: Vec<String>,
    /// Mints mentioned in postTokenBalances
    pub post_token_mints: Vec<String>,
}

/// Token supply for a mint
#[derive(Debug, Clone, Copy)]
pub struct TokenSupply {
    pub amount: u64,
    pub decimals: u8,
}

/// Signature listing entry
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
}

/// Read-side RPC surface the core depends on
#[async_trait]
pub trait ClusterRpcClient: Send + Sync {
    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<String>;

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[String],
    ) -> Result<Vec<Option<AccountSnapshot>>>;

    async fn get_account_info(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> Result<Option<AccountSnapshot>>;

    /// `None` means the node does not know the transaction (yet)
    async fn get_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> Result<Option<FetchedTransaction>>;

    async fn get_token_supply(&self, mint: &str) -> Result<TokenSupply>;

    /// Largest holder amounts, descending, at most 20 entries
    async fn get_token_largest_accounts(&self, mint: &str) -> Result<Vec<u64>>;

    async fn get_signatures_for_address(
        &self,
        pubkey: &str,
        limit: usize,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>>;

    async fn send_raw_transaction(&self, bytes: &[u8]) -> Result<String>;
}

/// Request for the snipe-mode swap intent placeholder
#[derive(Debug, Clone)]
pub struct BuildSwapRequest {
    pub cluster: Cluster,
    pub owner: String,
    pub amount_sol: f64,
    pub memo: String,
    pub recent_blockhash: String,
    pub cu_limit: Option<u32>,
    pub cu_price_micro_lamports: Option<u64>,
}

/// Request for a validator tip transaction
#[derive(Debug, Clone)]
pub struct BuildTipRequest {
    pub cluster: Cluster,
    pub owner: String,
    pub tip_account: String,
    pub tip_lamports: u64,
    pub memo: Option<String>,
    pub recent_blockhash: String,
}

/// Venue-agnostic unsigned transaction builder (snipe placeholder)
#[async_trait]
pub trait SwapAdapter: Send + Sync {
    async fn build_unsigned_buy_tx_base64(&self, req: &BuildSwapRequest) -> Result<String>;

    async fn build_unsigned_sell_tx_base64(&self, req: &BuildSwapRequest) -> Result<String>;

    async fn build_unsigned_tip_tx_base64(&self, req: &BuildTipRequest) -> Result<String>;
}

/// Quote request against the DEX aggregator
#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u32,
}

/// Aggregator quote; `raw` is passed back verbatim on swap build
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    pub out_amount: u64,
    pub raw: serde_json::Value,
}

/// Swap build request against the DEX aggregator
#[derive(Debug, Clone)]
pub struct AggregatorSwapRequest {
    pub quote: Quote,
    pub user_public_key: String,
    pub wrap_and_unwrap_sol: bool,
}

/// Volume-mode primary route (DEX aggregator)
#[async_trait]
pub trait DexAggregatorAdapter: Send + Sync {
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote>;

    async fn swap_tx_base64(&self, req: &AggregatorSwapRequest) -> Result<String>;
}

/// Trade direction for the trade-local endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Liquidity pool selector for the trade-local endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradePool {
    Pump,
    Raydium,
}

/// Request against the external trade-local endpoint
#[derive(Debug, Clone)]
pub struct TradeLocalRequest {
    pub owner: String,
    pub mint: String,
    pub action: TradeAction,
    pub pool: TradePool,
    pub amount_sol: f64,
    pub denominated_in_sol: bool,
    pub slippage_percent: u32,
    pub priority_fee_sol: Option<f64>,
}

/// Volume-mode fallback route (launchpad / AMM via trade-local).
/// Implementations normalize whatever the endpoint returns to base64.
#[async_trait]
pub trait TradeLocalAdapter: Send + Sync {
    async fn trade_tx_base64(&self, req: &TradeLocalRequest) -> Result<String>;
}

/// Block-engine surface the bundle lifecycle depends on
#[async_trait]
pub trait BlockEngineApi: Send + Sync {
    /// SHOULD be served from a 30-minute cache
    async fn get_tip_accounts(&self, cluster: Cluster) -> Result<Vec<String>>;

    async fn simulate_bundle(
        &self,
        cluster: Cluster,
        txs_base58: &[String],
    ) -> Result<serde_json::Value>;

    async fn send_bundle(
        &self,
        cluster: Cluster,
        txs_base58: &[String],
    ) -> Result<serde_json::Value>;

    async fn get_bundle_statuses(
        &self,
        cluster: Cluster,
        ids: &[String],
    ) -> Result<serde_json::Value>;
}
