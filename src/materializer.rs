//! Action materialization
//!
//! Builds the unsigned transaction list for a pending action just-in-time:
//! fresh blockhash, swap intent via the venue adapters, optional validator
//! tip appended last. Volume mode walks the route ladder
//! aggregator → launchpad → AMM and degrades roundtrip to buy-only on the
//! fallbacks.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::timeout;
use tracing::debug;

use crate::adapters::{
    AggregatorSwapRequest, BlockEngineApi, BuildSwapRequest, BuildTipRequest, ClusterRpcClient,
    Commitment, DexAggregatorAdapter, QuoteRequest, SwapAdapter, TradeAction, TradeLocalAdapter,
    TradeLocalRequest, TradePool,
};
use crate::cluster::Cluster;
use crate::discovery::{rpc_call, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS};
use crate::error::{Error, Result};
use crate::logs::LogLevel;
use crate::session::state::{SessionHandle, Snapshot};
use crate::session::types::{now_ms, ActionSource, Mode, PendingAction, PumpFunPhase};

/// Wrapped-SOL mint (aggregator input side)
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Compute budget for the swap intent
const SWAP_CU_LIMIT: u32 = 1_000_000;
const SWAP_CU_PRICE_MICRO_LAMPORTS: u64 = 20_000;

/// Tip lamports: base + U[0, jitter)
const TIP_BASE_LAMPORTS: u64 = 1000;
const TIP_JITTER_LAMPORTS: u64 = 50_000;

/// Per-call budget for the fallback trade builders
const FALLBACK_ROUTE_TIMEOUT: Duration = Duration::from_secs(5);

/// The venue adapters the materializer routes through
pub struct VenueAdapters {
    pub swap: Arc<dyn SwapAdapter>,
    pub aggregator: Arc<dyn DexAggregatorAdapter>,
    pub trade_local: Arc<dyn TradeLocalAdapter>,
}

struct ActionContext {
    trigger_signature: String,
    source: ActionSource,
    target_mint: Option<String>,
}

/// Materialize the session's pending action. Idempotent: an action that is
/// already materialized returns its transaction list unchanged.
pub async fn materialize(
    session: &Arc<SessionHandle>,
    rpc: &dyn ClusterRpcClient,
    sem: &tokio::sync::Semaphore,
    engine: &dyn BlockEngineApi,
    venues: &VenueAdapters,
) -> Result<Vec<String>> {
    let (snap, ctx) = {
        let state = session.lock().await;
        if !state.running {
            return Err(Error::SessionNotRunning(session.owner.clone()));
        }
        let Some(config) = state.config.clone() else {
            return Err(Error::SessionNotRunning(session.owner.clone()));
        };
        let Some(PendingAction::SignAndBundle(action)) = state.pending_action.as_ref() else {
            return Err(Error::NoPendingAction);
        };
        if !action.needs_unsigned_txs {
            return Ok(action.unsigned_txs_base64.clone());
        }
        (
            Snapshot {
                config,
                epoch: state.epoch,
            },
            ActionContext {
                trigger_signature: action.trigger_signature.clone(),
                source: action.source,
                target_mint: action.target_mint.clone(),
            },
        )
    };

    let built = build_for_mode(session, rpc, sem, engine, venues, &snap, &ctx).await;

    match built {
        Ok((txs, route)) => {
            let mut state = session.lock().await;
            if !state.guard(&snap) {
                return Err(Error::StaleEpoch);
            }
            match state.pending_action.as_mut() {
                Some(PendingAction::SignAndBundle(action))
                    if action.trigger_signature == ctx.trigger_signature
                        && action.needs_unsigned_txs =>
                {
                    action.unsigned_txs_base64 = txs.clone();
                    action.needs_unsigned_txs = false;
                }
                _ => return Err(Error::StaleEpoch),
            }
            if let Some(route) = route {
                state.last_volume_route = Some(route);
            }
            let line = format!(
                "materialized {} unsigned tx(s) for signal {}",
                txs.len(),
                ctx.trigger_signature
            );
            session.push_log(&mut state, LogLevel::Info, line);
            Ok(txs)
        }
        Err(e) => {
            let mut state = session.lock().await;
            if state.guard(&snap) {
                state.pending_action = None;
                if snap.config.mode == Mode::Volume {
                    // Throttle the timer so a broken route does not spin
                    state.last_volume_action_ms = now_ms();
                }
                let line = format!("materialization failed: {}", e);
                session.push_log(&mut state, LogLevel::Error, line);
            }
            Err(e)
        }
    }
}

async fn build_for_mode(
    session: &Arc<SessionHandle>,
    rpc: &dyn ClusterRpcClient,
    sem: &tokio::sync::Semaphore,
    engine: &dyn BlockEngineApi,
    venues: &VenueAdapters,
    snap: &Snapshot,
    ctx: &ActionContext,
) -> Result<(Vec<String>, Option<String>)> {
    let config = &snap.config;
    let cluster = config.cluster;
    let owner = session.owner.clone();

    let blockhash = rpc_call(sem, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS, || {
        rpc.get_latest_blockhash(Commitment::Processed)
    })
    .await?;

    let (mut txs, route) = match config.mode {
        Mode::Snipe => {
            let phase = match config.pump_fun_phase {
                PumpFunPhase::Pre => "pre",
                PumpFunPhase::Post => "post",
            };
            let source = match ctx.source {
                ActionSource::Raydium => "raydium",
                ActionSource::Pumpfun => "pumpfun",
                ActionSource::VolumeTimer => "volumeTimer",
            };
            let memo = format!(
                "snipe|{}|{}|{}|{}",
                phase,
                source,
                ctx.trigger_signature,
                ctx.target_mint.as_deref().unwrap_or("-")
            );
            let swap_tx = venues
                .swap
                .build_unsigned_buy_tx_base64(&BuildSwapRequest {
                    cluster,
                    owner: owner.clone(),
                    amount_sol: config.buy_amount_sol,
                    memo,
                    recent_blockhash: blockhash.clone(),
                    cu_limit: Some(SWAP_CU_LIMIT),
                    cu_price_micro_lamports: Some(SWAP_CU_PRICE_MICRO_LAMPORTS),
                })
                .await?;
            (vec![swap_tx], None)
        }
        Mode::Volume => {
            let (txs, route) =
                build_volume_routes(session, venues, snap, &owner, &blockhash).await?;
            (txs, Some(route))
        }
    };

    if config.mev_enabled {
        // Tip stays last
        if let Some(tip_tx) =
            build_tip_tx(session, engine, venues, cluster, &owner, &blockhash).await?
        {
            txs.push(tip_tx);
        }
    }

    Ok((txs, route))
}

/// Build the optional tip transaction. Returns None when the tip is skipped
/// (devnet, or the tip-account fetch failed).
async fn build_tip_tx(
    session: &Arc<SessionHandle>,
    engine: &dyn BlockEngineApi,
    venues: &VenueAdapters,
    cluster: Cluster,
    owner: &str,
    blockhash: &str,
) -> Result<Option<String>> {
    if cluster == Cluster::Devnet {
        session
            .log(LogLevel::Warn, "mev enabled on devnet, skipping tip")
            .await;
        return Ok(None);
    }

    let tip_accounts = match engine.get_tip_accounts(cluster).await {
        Ok(accounts) if !accounts.is_empty() => accounts,
        Ok(_) | Err(_) => {
            // Submit can still land without an explicit tip
            session
                .log(
                    LogLevel::Warn,
                    "tip accounts unavailable, proceeding without tip",
                )
                .await;
            return Ok(None);
        }
    };

    let (tip_account, tip_lamports) = {
        let mut rng = rand::thread_rng();
        let account = tip_accounts[rng.gen_range(0..tip_accounts.len())].clone();
        let lamports = TIP_BASE_LAMPORTS + rng.gen_range(0..TIP_JITTER_LAMPORTS);
        (account, lamports)
    };
    debug!("tip: {} lamports to {}", tip_lamports, tip_account);

    let tip_tx = venues
        .swap
        .build_unsigned_tip_tx_base64(&BuildTipRequest {
            cluster,
            owner: owner.to_string(),
            tip_account,
            tip_lamports,
            memo: Some("tip".to_string()),
            recent_blockhash: blockhash.to_string(),
        })
        .await?;
    Ok(Some(tip_tx))
}

/// Volume route ladder: aggregator, then launchpad, then AMM. Each later
/// route is attempted iff the prior raised.
async fn build_volume_routes(
    session: &Arc<SessionHandle>,
    venues: &VenueAdapters,
    snap: &Snapshot,
    owner: &str,
    _blockhash: &str,
) -> Result<(Vec<String>, String)> {
    let config = &snap.config;
    let volume = &config.volume;
    let Some(token_mint) = volume.token_mint.clone() else {
        return Err(Error::Materialize(
            "volume mode requires a token mint".to_string(),
        ));
    };
    let amount_lamports = (config.buy_amount_sol * LAMPORTS_PER_SOL as f64) as u64;

    // Route 1: DEX aggregator
    let primary_err = match build_aggregator_route(
        venues,
        owner,
        &token_mint,
        amount_lamports,
        volume.slippage_bps,
        volume.roundtrip,
    )
    .await
    {
        Ok(txs) => return Ok((txs, "jupiter".to_string())),
        Err(e) => e,
    };
    debug!("aggregator route failed: {}", primary_err);

    if volume.roundtrip {
        session
            .log(
                LogLevel::Warn,
                "roundtrip not supported on fallback routes, degrading to buy-only",
            )
            .await;
    }

    let slippage_percent = ((volume.slippage_bps + 99) / 100).max(1);
    let trade_request = |pool: TradePool| TradeLocalRequest {
        owner: owner.to_string(),
        mint: token_mint.clone(),
        action: TradeAction::Buy,
        pool,
        amount_sol: config.buy_amount_sol,
        denominated_in_sol: true,
        slippage_percent,
        priority_fee_sol: None,
    };

    // Route 2: pre-migration launchpad builder
    let pump_err = match timeout(
        FALLBACK_ROUTE_TIMEOUT,
        venues.trade_local.trade_tx_base64(&trade_request(TradePool::Pump)),
    )
    .await
    {
        Ok(Ok(tx)) => return Ok((vec![tx], "pumpfun".to_string())),
        Ok(Err(e)) => e,
        Err(_) => Error::RpcTimeout(FALLBACK_ROUTE_TIMEOUT.as_millis() as u64),
    };
    debug!("launchpad route failed: {}", pump_err);

    // Route 3: post-migration AMM builder
    let amm_err = match timeout(
        FALLBACK_ROUTE_TIMEOUT,
        venues
            .trade_local
            .trade_tx_base64(&trade_request(TradePool::Raydium)),
    )
    .await
    {
        Ok(Ok(tx)) => return Ok((vec![tx], "raydium".to_string())),
        Ok(Err(e)) => e,
        Err(_) => Error::RpcTimeout(FALLBACK_ROUTE_TIMEOUT.as_millis() as u64),
    };

    Err(Error::VolumeRoutesExhausted {
        primary: primary_err.to_string(),
        fallback: format!("pump: {}; raydium: {}", pump_err, amm_err),
    })
}

async fn build_aggregator_route(
    venues: &VenueAdapters,
    owner: &str,
    token_mint: &str,
    amount_lamports: u64,
    slippage_bps: u32,
    roundtrip: bool,
) -> Result<Vec<String>> {
    let quote = venues
        .aggregator
        .quote(&QuoteRequest {
            input_mint: WSOL_MINT.to_string(),
            output_mint: token_mint.to_string(),
            amount: amount_lamports,
            slippage_bps,
        })
        .await?;
    let out_amount = quote.out_amount;

    let buy_tx = venues
        .aggregator
        .swap_tx_base64(&AggregatorSwapRequest {
            quote,
            user_public_key: owner.to_string(),
            wrap_and_unwrap_sol: true,
        })
        .await?;

    let mut txs = vec![buy_tx];

    if roundtrip {
        let reverse_quote = venues
            .aggregator
            .quote(&QuoteRequest {
                input_mint: token_mint.to_string(),
                output_mint: WSOL_MINT.to_string(),
                amount: out_amount,
                slippage_bps,
            })
            .await?;
        let sell_tx = venues
            .aggregator
            .swap_tx_base64(&AggregatorSwapRequest {
                quote: reverse_quote,
                user_public_key: owner.to_string(),
                wrap_and_unwrap_sol: true,
            })
            .await?;
        txs.push(sell_tx);
    }

    Ok(txs)
}


#[cfg(test)]
mod tests {
    use super::testing::{MockAggregator, MockTradeLocal};
    use super::*;
    use crate::adapters::swap::PlaceholderSwapAdapter;
    use crate::bundle::testing::MockEngine;
    use crate::discovery::testing::MockRpc;
    use crate::session::types::{BotConfig, SignAndBundleAction};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::transaction::VersionedTransaction;
    use tokio::sync::{broadcast, Semaphore};

    fn owner_pubkey() -> String {
        Pubkey::new_unique().to_string()
    }

    async fn armed_session(
        cluster: Cluster,
        config: serde_json::Value,
        source: ActionSource,
        target_mint: Option<&str>,
    ) -> (Arc<SessionHandle>, Snapshot) {
        let (viz_tx, _) = broadcast::channel(16);
        let session = Arc::new(SessionHandle::new(owner_pubkey(), cluster, viz_tx));
        let config: BotConfig = serde_json::from_value(config).unwrap();
        let snap = session.start(config).await;
        let armed = session
            .try_arm(
                &snap,
                SignAndBundleAction {
                    reason: "test".to_string(),
                    unsigned_txs_base64: vec![],
                    trigger_signature: "trigger-sig".to_string(),
                    source,
                    target_mint: target_mint.map(|s| s.to_string()),
                    needs_unsigned_txs: true,
                },
            )
            .await;
        assert!(armed);
        (session, snap)
    }

    fn venues(aggregator: MockAggregator, trade_local: MockTradeLocal) -> VenueAdapters {
        VenueAdapters {
            swap: Arc::new(PlaceholderSwapAdapter::new()),
            aggregator: Arc::new(aggregator),
            trade_local: Arc::new(trade_local),
        }
    }

    fn decode(b64: &str) -> VersionedTransaction {
        bincode::deserialize(&BASE64.decode(b64).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_snipe_materialization_with_tip_last() {
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({
                "cluster": "mainnet", "mode": "snipe",
                "pumpFunPhase": "pre", "mevEnabled": true,
            }),
            ActionSource::Pumpfun,
            Some("MintA"),
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let tip_account = Pubkey::new_unique();
        let engine = MockEngine::with_tip_accounts(vec![tip_account.to_string()]);
        let venues = venues(MockAggregator::default(), MockTradeLocal::default());

        let txs = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);

        // Last element is the tip: a system transfer to the tip account
        let tip_tx = decode(&txs[1]);
        let keys = tip_tx.message.static_account_keys();
        let transfer = &tip_tx.message.instructions()[0];
        assert_eq!(keys[transfer.accounts[1] as usize], tip_account);
        let lamports = u64::from_le_bytes(transfer.data[4..12].try_into().unwrap());
        assert!((TIP_BASE_LAMPORTS..TIP_BASE_LAMPORTS + TIP_JITTER_LAMPORTS).contains(&lamports));

        // Action now carries the txs and no longer needs materialization
        let view = session.view().await;
        let action = view.pending_action.unwrap();
        assert!(!action.sign_and_bundle().needs_unsigned_txs);
        assert_eq!(action.sign_and_bundle().unsigned_txs_base64.len(), 2);
    }

    #[tokio::test]
    async fn test_devnet_skips_tip_with_warning() {
        let (session, _snap) = armed_session(
            Cluster::Devnet,
            serde_json::json!({
                "cluster": "devnet", "mode": "snipe",
                "pumpFunPhase": "pre", "mevEnabled": true,
            }),
            ActionSource::Pumpfun,
            None,
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let venues = venues(MockAggregator::default(), MockTradeLocal::default());

        let txs = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        assert_eq!(txs.len(), 1, "no tip on devnet");

        let view = session.view().await;
        assert!(view
            .session_logs
            .iter()
            .any(|l| l.message.contains("skipping tip")));
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({ "cluster": "mainnet", "mode": "snipe" }),
            ActionSource::Pumpfun,
            None,
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let venues = venues(MockAggregator::default(), MockTradeLocal::default());

        let first = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        let second = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_volume_fallback_route_order_and_degradation() {
        // Scenario: aggregator cannot trade the mint, launchpad route works;
        // roundtrip degrades to a single buy leg with a warning
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({
                "cluster": "mainnet", "mode": "volume",
                "volume": {
                    "enabled": true, "tokenMint": "TokenT",
                    "slippageBps": 250, "roundtrip": true
                },
            }),
            ActionSource::VolumeTimer,
            Some("TokenT"),
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let aggregator = MockAggregator {
            fail: true,
            ..Default::default()
        };
        let venues = venues(aggregator, MockTradeLocal::default());

        let txs = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        assert_eq!(txs.len(), 1, "roundtrip degraded to one leg");

        let state = session.lock().await;
        assert_eq!(state.last_volume_route.as_deref(), Some("pumpfun"));
        assert!(state
            .logs
            .snapshot()
            .iter()
            .any(|l| l.message.contains("roundtrip not supported")));
    }

    #[tokio::test]
    async fn test_volume_route_attempts_strictly_ordered() {
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({
                "cluster": "mainnet", "mode": "volume",
                "volume": { "enabled": true, "tokenMint": "TokenT" },
            }),
            ActionSource::VolumeTimer,
            Some("TokenT"),
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let aggregator = Arc::new(MockAggregator {
            fail: true,
            ..Default::default()
        });
        let trade_local = Arc::new(MockTradeLocal {
            fail_pump: true,
            fail_raydium: false,
            ..Default::default()
        });
        let venues = VenueAdapters {
            swap: Arc::new(PlaceholderSwapAdapter::new()),
            aggregator: aggregator.clone(),
            trade_local: trade_local.clone(),
        };

        materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();

        assert_eq!(
            *trade_local.attempts.lock().unwrap(),
            vec!["pump".to_string(), "raydium".to_string()]
        );
        let state = session.lock().await;
        assert_eq!(state.last_volume_route.as_deref(), Some("raydium"));
    }

    #[tokio::test]
    async fn test_volume_all_routes_exhausted_clears_pending_and_throttles() {
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({
                "cluster": "mainnet", "mode": "volume",
                "volume": { "enabled": true, "tokenMint": "TokenT" },
            }),
            ActionSource::VolumeTimer,
            Some("TokenT"),
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let venues = VenueAdapters {
            swap: Arc::new(PlaceholderSwapAdapter::new()),
            aggregator: Arc::new(MockAggregator {
                fail: true,
                ..Default::default()
            }),
            trade_local: Arc::new(MockTradeLocal {
                fail_pump: true,
                fail_raydium: true,
                ..Default::default()
            }),
        };

        let result = materialize(&session, &rpc, &sem, &engine, &venues).await;
        assert!(matches!(result, Err(Error::VolumeRoutesExhausted { .. })));

        let state = session.lock().await;
        assert!(state.pending_action.is_none());
        assert!(state.last_volume_action_ms > 0, "retry throttle bumped");
    }

    #[tokio::test]
    async fn test_volume_roundtrip_builds_two_legs_on_primary() {
        let (session, _snap) = armed_session(
            Cluster::Mainnet,
            serde_json::json!({
                "cluster": "mainnet", "mode": "volume",
                "volume": { "enabled": true, "tokenMint": "TokenT", "roundtrip": true },
            }),
            ActionSource::VolumeTimer,
            Some("TokenT"),
        )
        .await;
        let rpc = MockRpc::default();
        let sem = Semaphore::new(2);
        let engine = MockEngine::default();
        let venues = venues(MockAggregator::default(), MockTradeLocal::default());

        let txs = materialize(&session, &rpc, &sem, &engine, &venues)
            .await
            .unwrap();
        assert_eq!(txs.len(), 2, "buy leg + reverse leg");

        let state = session.lock().await;
        assert_eq!(state.last_volume_route.as_deref(), Some("jupiter"));
    }
}
