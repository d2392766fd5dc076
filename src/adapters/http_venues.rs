//! HTTP-backed venue adapters
//!
//! Production implementations of the volume-mode routes: the Jupiter quote
//! and swap API as the primary, and the trade-local endpoint for the
//! launchpad/AMM fallbacks. The trade-local endpoint has returned base64
//! text, base58 text and raw bytes across versions; everything is
//! normalized to base64 before it reaches the core.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AggregatorSwapRequest, DexAggregatorAdapter, Quote, QuoteRequest, TradeAction,
    TradeLocalAdapter, TradeLocalRequest, TradePool,
};
use crate::error::{Error, Result};

/// Jupiter v6 endpoints
pub const JUPITER_QUOTE_URL: &str = "https://quote-api.jup.ag/v6/quote";
pub const JUPITER_SWAP_URL: &str = "https://quote-api.jup.ag/v6/swap";

/// Trade-local endpoint (build-your-own-tx API)
pub const TRADE_LOCAL_URL: &str = "https://pumpportal.fun/api/trade-local";

/// DEX aggregator over the Jupiter HTTP API
pub struct JupiterAdapter {
    http: Client,
    quote_url: String,
    swap_url: String,
}

impl JupiterAdapter {
    pub fn new() -> Result<Self> {
        Self::with_urls(JUPITER_QUOTE_URL, JUPITER_SWAP_URL)
    }

    pub fn with_urls(quote_url: &str, swap_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            quote_url: quote_url.to_string(),
            swap_url: swap_url.to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapBody {
    quote_response: serde_json::Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapResponse {
    swap_transaction: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl DexAggregatorAdapter for JupiterAdapter {
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote> {
        let response = self
            .http
            .get(&self.quote_url)
            .query(&[
                ("inputMint", req.input_mint.as_str()),
                ("outputMint", req.output_mint.as_str()),
                ("amount", &req.amount.to_string()),
                ("slippageBps", &req.slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("aggregator quote failed: {}", e)))?;

        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("aggregator quote: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Rpc(format!("aggregator quote HTTP {}: {}", status, raw)));
        }

        let out_amount = raw
            .get("outAmount")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Deserialization("aggregator quote missing outAmount".into()))?;

        Ok(Quote { out_amount, raw })
    }

    async fn swap_tx_base64(&self, req: &AggregatorSwapRequest) -> Result<String> {
        let body = JupiterSwapBody {
            quote_response: req.quote.raw.clone(),
            user_public_key: req.user_public_key.clone(),
            wrap_and_unwrap_sol: req.wrap_and_unwrap_sol,
        };

        let response = self
            .http
            .post(&self.swap_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("aggregator swap failed: {}", e)))?;

        let parsed: JupiterSwapResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("aggregator swap: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(Error::Rpc(format!("aggregator swap: {}", error)));
        }

        parsed
            .swap_transaction
            .ok_or_else(|| Error::Deserialization("aggregator swap missing transaction".into()))
    }
}

/// Trade-local request body, camelCase per the endpoint
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeLocalBody {
    action: TradeAction,
    mint: String,
    amount: String,
    denominated_in_sol: String,
    slippage: u32,
    priority_fee: f64,
    public_key: String,
    pool: TradePool,
}

#[derive(Deserialize)]
struct TradeLocalJsonResponse {
    transaction: Option<String>,
    error: Option<String>,
}

/// Launchpad/AMM fallback over the trade-local HTTP endpoint
pub struct TradeLocalHttpAdapter {
    http: Client,
    url: String,
}

impl TradeLocalHttpAdapter {
    pub fn new() -> Result<Self> {
        Self::with_url(TRADE_LOCAL_URL)
    }

    pub fn with_url(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

/// Normalize a trade-local response body to a base64 transaction
fn normalize_tx_encoding(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::Deserialization("empty trade-local response".into()));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.trim();

        // JSON envelope with a transaction or error field
        if text.starts_with('{') {
            let parsed: TradeLocalJsonResponse = serde_json::from_str(text)
                .map_err(|e| Error::Deserialization(format!("trade-local response: {}", e)))?;
            if let Some(error) = parsed.error {
                return Err(Error::Rpc(format!("trade-local: {}", error)));
            }
            return parsed
                .transaction
                .ok_or_else(|| Error::Deserialization("trade-local missing transaction".into()));
        }

        // Already base64?
        if BASE64.decode(text).is_ok() {
            return Ok(text.to_string());
        }

        // Base58 text
        if let Ok(decoded) = bs58::decode(text).into_vec() {
            return Ok(BASE64.encode(decoded));
        }
    }

    // Raw transaction bytes
    Ok(BASE64.encode(bytes))
}

#[async_trait]
impl TradeLocalAdapter for TradeLocalHttpAdapter {
    async fn trade_tx_base64(&self, req: &TradeLocalRequest) -> Result<String> {
        let body = TradeLocalBody {
            action: req.action,
            mint: req.mint.clone(),
            amount: req.amount_sol.to_string(),
            denominated_in_sol: req.denominated_in_sol.to_string(),
            slippage: req.slippage_percent,
            priority_fee: req.priority_fee_sol.unwrap_or(0.0),
            public_key: req.owner.clone(),
            pool: req.pool,
        };

        debug!("trade-local {} via {:?} pool", req.mint, req.pool);

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("trade-local request failed: {}", e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Rpc(format!("trade-local body read failed: {}", e)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).to_string();
            return Err(Error::Rpc(format!("trade-local HTTP {}: {}", status, text)));
        }

        normalize_tx_encoding(&bytes)
    }
}
