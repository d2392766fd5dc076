//! Signal router
//!
//! Fans a deduplicated notification out to every session of the cluster,
//! applies the mode × phase × target-mode table and either hands the signal
//! to auto-discovery or arms the session directly. All session mutations go
//! through the captured `(config, epoch)` snapshot.

use std::sync::Arc;

use tracing::debug;

use crate::adapters::ClusterRpcClient;
use crate::discovery;
use crate::logs::LogLevel;
use crate::session::registry::ClusterRuntime;
use crate::session::state::{SessionHandle, Snapshot};
use crate::session::types::{
    now_ms, Mode, PumpFunPhase, SignAndBundleAction, SnipeTargetMode,
};
use crate::stream::{RawSignal, SignalSource};

/// Empty snipe-list warnings are throttled to one per minute per session
const EMPTY_LIST_WARN_INTERVAL_MS: u64 = 60_000;

/// Does this session's mode/phase accept signals from `source`?
fn accepts(mode: Mode, phase: PumpFunPhase, source: SignalSource) -> bool {
    match (mode, phase, source) {
        (Mode::Snipe, PumpFunPhase::Pre, SignalSource::Pumpfun) => true,
        (Mode::Snipe, PumpFunPhase::Post, SignalSource::Raydium) => true,
        (Mode::Volume, _, SignalSource::Raydium) => true,
        _ => false,
    }
}

/// Route one signal to every session of the cluster. Per-session work runs
/// concurrently; within a session it serializes on the session mutex.
pub async fn dispatch(
    runtime: &Arc<ClusterRuntime>,
    rpc: &Arc<dyn ClusterRpcClient>,
    signal: RawSignal,
) {
    let signal = Arc::new(signal);
    for session in runtime.session_handles() {
        let runtime = runtime.clone();
        let rpc = rpc.clone();
        let signal = signal.clone();
        tokio::spawn(async move {
            process_for_session(&runtime, &session, &rpc, &signal).await;
        });
    }
}

/// Apply the routing table and target selection for a single session
pub async fn process_for_session(
    runtime: &Arc<ClusterRuntime>,
    session: &Arc<SessionHandle>,
    rpc: &Arc<dyn ClusterRpcClient>,
    signal: &RawSignal,
) {
    let snap: Snapshot = {
        let mut state = session.lock().await;
        if !state.running || state.pending_action.is_some() {
            return;
        }
        let Some(config) = state.config.clone() else {
            return;
        };
        if !accepts(config.mode, config.pump_fun_phase, signal.source) {
            return;
        }

        if SessionHandle::heartbeat_due(&mut state, signal.source) {
            let line = format!("[{}] {}", signal.source, state.auto_stats.summary());
            session.push_log(&mut state, LogLevel::Info, line);
        }

        let epoch = state.epoch;
        Snapshot { config, epoch }
    };

    match (snap.config.mode, snap.config.snipe_target_mode) {
        (Mode::Volume, _) => {
            // Volume actions are produced by the timer, never by signals
        }
        (Mode::Snipe, SnipeTargetMode::Auto) => match snap.config.pump_fun_phase {
            PumpFunPhase::Pre => {
                let mint =
                    discovery::evaluate(session, &snap, rpc.as_ref(), &runtime.rpc_sem, signal)
                        .await;
                if let Some(mint) = mint {
                    let action = SignAndBundleAction {
                        reason: format!(
                            "auto-snipe trigger for {} (signal {})",
                            mint, signal.signature
                        ),
                        unsigned_txs_base64: vec![],
                        trigger_signature: signal.signature.clone(),
                        source: signal.source.into(),
                        target_mint: Some(mint),
                        needs_unsigned_txs: true,
                    };
                    session.try_arm(&snap, action).await;
                }
            }
            PumpFunPhase::Post => {
                // Post-migration auto mode arms on the pool-init signal
                // itself; there is no momentum window for AMM pools.
                let action = SignAndBundleAction {
                    reason: format!("pool-init signal {}", signal.signature),
                    unsigned_txs_base64: vec![],
                    trigger_signature: signal.signature.clone(),
                    source: signal.source.into(),
                    target_mint: None,
                    needs_unsigned_txs: true,
                };
                session.try_arm(&snap, action).await;
            }
        },
        (Mode::Snipe, SnipeTargetMode::List) => {
            handle_list_mode(runtime, session, rpc, signal, &snap).await;
        }
    }
}

/// List mode: arm only when the triggering transaction mentions a mint from
/// the session's snipe list.
async fn handle_list_mode(
    runtime: &Arc<ClusterRuntime>,
    session: &Arc<SessionHandle>,
    rpc: &Arc<dyn ClusterRpcClient>,
    signal: &RawSignal,
    snap: &Snapshot,
) {
    if snap.config.snipe_list.is_empty() {
        let mut state = session.lock().await;
        if !state.guard(snap) {
            return;
        }
        let now = now_ms();
        if now.saturating_sub(state.last_empty_list_warn_ms) >= EMPTY_LIST_WARN_INTERVAL_MS {
            state.last_empty_list_warn_ms = now;
            session.push_log(
                &mut state,
                LogLevel::Warn,
                "snipe list is empty, dropping signals",
            );
        }
        return;
    }

    let Some(tx) =
        discovery::fetch_transaction(rpc.as_ref(), &runtime.rpc_sem, &signal.signature).await
    else {
        debug!("list mode: transaction {} not found", signal.signature);
        return;
    };

    let Some(matched) = tx
        .account_keys
        .iter()
        .find(|key| snap.config.snipe_list.contains(key))
        .cloned()
    else {
        return;
    };

    let action = SignAndBundleAction {
        reason: format!(
            "snipe-list match {} (signal {})",
            matched, signal.signature
        ),
        unsigned_txs_base64: vec![],
        trigger_signature: signal.signature.clone(),
        source: signal.source.into(),
        target_mint: Some(matched),
        needs_unsigned_txs: true,
    };
    session.try_arm(snap, action).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FetchedTransaction;
    use crate::cluster::Cluster;
    use crate::discovery::testing::MockRpc;
    use crate::session::registry::Registry;
    use crate::session::types::{ActionSource, BotConfig};

    fn signal(source: SignalSource, sig: &str, log: &str) -> RawSignal {
        RawSignal {
            source,
            signature: sig.to_string(),
            logs: vec![log.to_string()],
        }
    }

    fn config(value: serde_json::Value) -> BotConfig {
        serde_json::from_value(value).unwrap()
    }

    async fn setup(
        cluster: Cluster,
        cfg: BotConfig,
    ) -> (Arc<ClusterRuntime>, Arc<SessionHandle>, Snapshot) {
        let registry = Registry::new(2);
        let runtime = registry.runtime(cluster);
        let session = runtime.session("owner1");
        let snap = session.start(cfg).await;
        (runtime, session, snap)
    }

    #[tokio::test]
    async fn test_phase_routing_rejects_wrong_source() {
        let cfg = config(serde_json::json!({
            "cluster": "mainnet", "mode": "snipe",
            "pumpFunPhase": "post", "snipeTargetMode": "auto",
        }));
        let (runtime, session, _snap) = setup(Cluster::Mainnet, cfg).await;
        let rpc: Arc<dyn ClusterRpcClient> = Arc::new(MockRpc::default());

        // Post phase only accepts raydium; a pumpfun signal is dropped
        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Pumpfun, "sig1", "Program log: Instruction: Create"),
        )
        .await;
        assert!(session.view().await.pending_action.is_none());

        // A raydium pool-init signal arms directly in post+auto
        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Raydium, "sig2", "initialize2"),
        )
        .await;
        let action = session.view().await.pending_action.unwrap();
        assert_eq!(action.sign_and_bundle().trigger_signature, "sig2");
        assert_eq!(action.sign_and_bundle().source, ActionSource::Raydium);
    }

    #[tokio::test]
    async fn test_volume_mode_never_armed_by_signals() {
        let cfg = config(serde_json::json!({
            "cluster": "mainnet", "mode": "volume",
            "volume": { "enabled": true, "tokenMint": "T" },
        }));
        let (runtime, session, _snap) = setup(Cluster::Mainnet, cfg).await;
        let rpc: Arc<dyn ClusterRpcClient> = Arc::new(MockRpc::default());

        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Raydium, "sig1", "initialize2"),
        )
        .await;
        assert!(session.view().await.pending_action.is_none());
    }

    #[tokio::test]
    async fn test_list_mode_arms_on_mint_match() {
        let cfg = config(serde_json::json!({
            "cluster": "mainnet", "mode": "snipe",
            "pumpFunPhase": "post", "snipeTargetMode": "list",
            "snipeList": ["MintA", "MintB"],
        }));
        let (runtime, session, _snap) = setup(Cluster::Mainnet, cfg).await;

        let mock = MockRpc::default();
        mock.put_tx(
            "sig1",
            FetchedTransaction {
                account_keys: vec!["payer".to_string(), "MintB".to_string()],
                pre_token_mints: vec![],
                post_token_mints: vec![],
            },
        );
        let rpc: Arc<dyn ClusterRpcClient> = Arc::new(mock);

        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Raydium, "sig1", "initialize2"),
        )
        .await;

        let action = session.view().await.pending_action.unwrap();
        assert_eq!(
            action.sign_and_bundle().target_mint.as_deref(),
            Some("MintB")
        );
        assert!(action.sign_and_bundle().needs_unsigned_txs);
    }

    #[tokio::test]
    async fn test_list_mode_empty_list_warns_once_per_minute() {
        let cfg = config(serde_json::json!({
            "cluster": "mainnet", "mode": "snipe",
            "pumpFunPhase": "post", "snipeTargetMode": "list",
        }));
        let (runtime, session, _snap) = setup(Cluster::Mainnet, cfg).await;
        let rpc: Arc<dyn ClusterRpcClient> = Arc::new(MockRpc::default());

        for i in 0..3 {
            process_for_session(
                &runtime,
                &session,
                &rpc,
                &signal(SignalSource::Raydium, &format!("sig{}", i), "initialize2"),
            )
            .await;
        }

        let view = session.view().await;
        assert!(view.pending_action.is_none());
        let warns = view
            .session_logs
            .iter()
            .filter(|l| l.message.contains("snipe list is empty"))
            .count();
        assert_eq!(warns, 1);
    }

    #[tokio::test]
    async fn test_existing_pending_action_blocks_processing() {
        let cfg = config(serde_json::json!({
            "cluster": "mainnet", "mode": "snipe",
            "pumpFunPhase": "post", "snipeTargetMode": "auto",
        }));
        let (runtime, session, _snap) = setup(Cluster::Mainnet, cfg).await;
        let rpc: Arc<dyn ClusterRpcClient> = Arc::new(MockRpc::default());

        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Raydium, "sig1", "initialize2"),
        )
        .await;
        process_for_session(
            &runtime,
            &session,
            &rpc,
            &signal(SignalSource::Raydium, "sig2", "initialize2"),
        )
        .await;

        let action = session.view().await.pending_action.unwrap();
        assert_eq!(action.sign_and_bundle().trigger_signature, "sig1");
    }
}
