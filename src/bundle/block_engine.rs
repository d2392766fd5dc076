//! Block-engine JSON-RPC client
//!
//! Submits bundles and serves the tip-account list. Rate limits (HTTP 429)
//! are retried with jittered exponential backoff; every other non-2xx
//! raises with the decoded message. Tip accounts are cached for 30 minutes
//! and served stale when a refresh fails.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::adapters::BlockEngineApi;
use crate::cluster::Cluster;
use crate::config::BlockEngineConfig;
use crate::error::{Error, Result};

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: String,
    #[allow(dead_code)]
    #[serde(default)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize, Debug)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Jittered backoff before a rate-limit retry: `base·2^(attempt-1) + U[0,200)` ms
fn rate_limit_backoff(attempt: u32, base_ms: u64) -> Duration {
    let exp = base_ms << (attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..200);
    Duration::from_millis(exp + jitter)
}

struct CachedTips {
    accounts: Vec<String>,
    fetched_at: Instant,
}

/// Tip-account cache with stale-on-error semantics
pub struct TipCache {
    ttl: Duration,
    state: RwLock<Option<CachedTips>>,
}

impl TipCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Serve from cache while fresh; otherwise run `fetch` exactly once,
    /// falling back to the stale entry when the refresh fails.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.accounts.clone());
                }
            }
        }

        let mut state = self.state.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = state.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.accounts.clone());
            }
        }

        match fetch().await {
            Ok(accounts) => {
                *state = Some(CachedTips {
                    accounts: accounts.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(accounts)
            }
            Err(e) => match state.as_ref() {
                Some(stale) => {
                    warn!("tip account refresh failed, serving stale cache: {}", e);
                    Ok(stale.accounts.clone())
                }
                None => Err(e),
            },
        }
    }
}

/// Block-engine client for bundle simulation and submission
pub struct BlockEngineClient {
    config: BlockEngineConfig,
    http: Client,
    tip_cache: TipCache,
}

impl BlockEngineClient {
    pub fn new(config: BlockEngineConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let tip_cache = TipCache::new(Duration::from_secs(config.tip_cache_ttl_secs));
        info!("block engine client initialized for {}", config.url);

        Ok(Self {
            config,
            http,
            tip_cache,
        })
    }

    /// POST one JSON-RPC call, retrying only on HTTP 429
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/api/v1/bundles", self.config.url);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let max_attempts = self.config.retry_attempts;
        let mut last_err = Error::BlockEngineRateLimited;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = rate_limit_backoff(attempt - 1, self.config.retry_base_delay_ms);
                debug!("block engine retry {} after {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::BlockEngine(format!("{} request failed: {}", method, e)))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!("block engine rate limited (429) on {}", method);
                last_err = Error::BlockEngineRateLimited;
                continue;
            }

            if !status.is_success() {
                let message = serde_json::from_str::<JsonRpcResponse>(&body)
                    .ok()
                    .and_then(|r| r.error)
                    .map(|e| e.message)
                    .unwrap_or(body);
                return Err(Error::BlockEngine(format!("HTTP {}: {}", status, message)));
            }

            let parsed: JsonRpcResponse = serde_json::from_str(&body)
                .map_err(|e| Error::BlockEngine(format!("Invalid {} response: {}", method, e)))?;

            if let Some(error) = parsed.error {
                return Err(Error::BlockEngine(format!(
                    "{} (code {})",
                    error.message, error.code
                )));
            }

            return parsed
                .result
                .ok_or_else(|| Error::BlockEngine(format!("{}: empty result", method)));
        }

        Err(last_err)
    }
}

#[async_trait]
impl BlockEngineApi for BlockEngineClient {
    async fn get_tip_accounts(&self, _cluster: Cluster) -> Result<Vec<String>> {
        self.tip_cache
            .get_or_refresh(|| async {
                let result = self.call("getTipAccounts", serde_json::json!([])).await?;
                serde_json::from_value::<Vec<String>>(result)
                    .map_err(|e| Error::BlockEngine(format!("Bad tip account list: {}", e)))
            })
            .await
    }

    async fn simulate_bundle(
        &self,
        _cluster: Cluster,
        txs_base58: &[String],
    ) -> Result<serde_json::Value> {
        self.call("simulateBundle", serde_json::json!([txs_base58]))
            .await
    }

    async fn send_bundle(
        &self,
        _cluster: Cluster,
        txs_base58: &[String],
    ) -> Result<serde_json::Value> {
        self.call("sendBundle", serde_json::json!([txs_base58]))
            .await
    }

    async fn get_bundle_statuses(
        &self,
        _cluster: Cluster,
        ids: &[String],
    ) -> Result<serde_json::Value> {
        self.call("getBundleStatuses", serde_json::json!([ids]))
            .await
    }
}
