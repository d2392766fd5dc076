//! Bundle lifecycle: prepare → submit → status
//!
//! Signed transactions come back from the browser wallet as base64; the
//! block engine wants base58. Prepare validates the tip-last convention
//! (warning only), simulates, records the bundle and clears the session's
//! pending action so the same opportunity is never prompted twice.

pub mod block_engine;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use solana_sdk::transaction::VersionedTransaction;
use tracing::debug;
use uuid::Uuid;

use crate::adapters::BlockEngineApi;
use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::logs::LogLevel;
use crate::session::state::SessionHandle;
use crate::session::types::{now_ms, BundleState, BundleStatus, PreparedBundle};

/// Block-engine bundle size limit
pub const MAX_BUNDLE_TXS: usize = 5;

/// Prepare result returned to the edge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareOutcome {
    pub local_id: String,
    pub simulation: serde_json::Value,
}

/// Submit result returned to the edge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub local_id: String,
    pub send_result: serde_json::Value,
}

/// Decode one base64 signed transaction into (tx, raw bytes)
fn decode_signed_tx(b64: &str) -> Result<(VersionedTransaction, Vec<u8>)> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| Error::TransactionDecode(format!("base64: {}", e)))?;
    let tx: VersionedTransaction = bincode::deserialize(&bytes)
        .map_err(|e| Error::TransactionDecode(format!("bincode: {}", e)))?;
    Ok((tx, bytes))
}

/// First signature of a transaction, base58
fn first_signature(tx: &VersionedTransaction) -> Option<String> {
    tx.signatures.first().map(|s| s.to_string())
}

/// Is this transaction a native transfer whose destination is a known tip
/// account? Checks top-level instructions only.
fn is_tip_transfer(tx: &VersionedTransaction, tip_accounts: &[String]) -> bool {
    let keys = tx.message.static_account_keys();
    for ix in tx.message.instructions() {
        let Some(program) = keys.get(ix.program_id_index as usize) else {
            continue;
        };
        if *program != solana_sdk::system_program::ID {
            continue;
        }
        // SystemInstruction::Transfer: variant tag 2 (u32 LE) + lamports u64
        if ix.data.len() < 12 || ix.data[0..4] != [2, 0, 0, 0] {
            continue;
        }
        let Some(&dest_index) = ix.accounts.get(1) else {
            continue;
        };
        if let Some(dest) = keys.get(dest_index as usize) {
            if tip_accounts.iter().any(|t| t == &dest.to_string()) {
                return true;
            }
        }
    }
    false
}

/// Validate, simulate and record a signed bundle. Clears the session's
/// pending action on success.
pub async fn prepare(
    session: &Arc<SessionHandle>,
    engine: &dyn BlockEngineApi,
    cluster: Cluster,
    signed_txs_base64: &[String],
) -> Result<PrepareOutcome> {
    if cluster == Cluster::Devnet {
        return Err(Error::MainnetOnly);
    }
    if signed_txs_base64.is_empty() {
        return Err(Error::EmptyBundle);
    }
    if signed_txs_base64.len() > MAX_BUNDLE_TXS {
        return Err(Error::BundleTooLarge {
            got: signed_txs_base64.len(),
            max: MAX_BUNDLE_TXS,
        });
    }

    let mut decoded = Vec::with_capacity(signed_txs_base64.len());
    for b64 in signed_txs_base64 {
        decoded.push(decode_signed_tx(b64)?);
    }

    let signatures: Vec<String> = decoded
        .iter()
        .filter_map(|(tx, _)| first_signature(tx))
        .collect();

    // Tip-last convention is advisory: a bundle without an explicit tip can
    // still land under congestion pricing.
    match engine.get_tip_accounts(cluster).await {
        Ok(tip_accounts) => {
            let last = &decoded.last().expect("non-empty bundle").0;
            if !is_tip_transfer(last, &tip_accounts) {
                session
                    .log(LogLevel::Warn, "no tip detected in last bundle transaction")
                    .await;
            }
        }
        Err(e) => {
            session
                .log(
                    LogLevel::Warn,
                    format!("tip account lookup failed, skipping tip check: {}", e),
                )
                .await;
        }
    }

    let txs_base58: Vec<String> = decoded
        .iter()
        .map(|(_, bytes)| bs58::encode(bytes).into_string())
        .collect();

    let simulation = engine.simulate_bundle(cluster, &txs_base58).await?;

    let local_id = Uuid::new_v4().to_string();
    let now = now_ms();
    {
        let mut state = session.lock().await;
        state.prepared_bundles.insert(
            local_id.clone(),
            PreparedBundle {
                local_id: local_id.clone(),
                signed_txs_base58: txs_base58,
                created_at_ms: now,
            },
        );
        state.bundles.insert(
            local_id.clone(),
            BundleStatus {
                local_id: local_id.clone(),
                remote_id: None,
                state: BundleState::Prepared,
                created_at_ms: now,
                last_update_ms: now,
                jito_status: None,
                simulation: Some(simulation.clone()),
                error: None,
                signatures,
            },
        );
        // One signing prompt per opportunity
        state.pending_action = None;
        let line = format!("bundle {} prepared ({} txs)", local_id, decoded.len());
        session.push_log(&mut state, LogLevel::Info, line);
    }

    Ok(PrepareOutcome {
        local_id,
        simulation,
    })
}

/// Send a prepared bundle to the block engine and poll its status once
pub async fn submit(
    session: &Arc<SessionHandle>,
    engine: &dyn BlockEngineApi,
    cluster: Cluster,
    local_id: &str,
) -> Result<SubmitOutcome> {
    if cluster == Cluster::Devnet {
        return Err(Error::MainnetOnly);
    }

    let prepared = {
        let state = session.lock().await;
        state
            .prepared_bundles
            .get(local_id)
            .cloned()
            .ok_or_else(|| Error::BundleNotFound(local_id.to_string()))?
    };

    let send_result = match engine.send_bundle(cluster, &prepared.signed_txs_base58).await {
        Ok(result) => result,
        Err(e) => {
            let mut state = session.lock().await;
            if let Some(record) = state.bundles.get_mut(local_id) {
                record.state = BundleState::Error;
                record.error = Some(e.to_string());
                record.last_update_ms = now_ms();
            }
            let line = format!("bundle {} submission failed: {}", local_id, e);
            session.push_log(&mut state, LogLevel::Error, line);
            return Err(e);
        }
    };

    let remote_id = send_result.as_str().map(|s| s.to_string());
    let poll_id = remote_id.clone().unwrap_or_else(|| local_id.to_string());

    {
        let mut state = session.lock().await;
        if let Some(record) = state.bundles.get_mut(local_id) {
            record.state = BundleState::Submitted;
            record.remote_id = remote_id.clone();
            record.last_update_ms = now_ms();
        }
        let line = format!(
            "bundle {} submitted{}",
            local_id,
            remote_id
                .as_deref()
                .map(|r| format!(" (remote {})", r))
                .unwrap_or_default()
        );
        session.push_log(&mut state, LogLevel::Info, line);
    }

    // Single best-effort poll; the edge drives any further polling
    match engine.get_bundle_statuses(cluster, &[poll_id]).await {
        Ok(status) => {
            let mut state = session.lock().await;
            if let Some(record) = state.bundles.get_mut(local_id) {
                record.jito_status = Some(status);
                record.last_update_ms = now_ms();
            }
        }
        Err(e) => debug!("bundle {} status poll failed: {}", local_id, e),
    }

    Ok(SubmitOutcome {
        local_id: local_id.to_string(),
        send_result,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::MockEngine;
    use super::*;
    use crate::session::types::{ActionSource, BotConfig, PendingAction, SignAndBundleAction};
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;
    use solana_sdk::transaction::Transaction;
    use tokio::sync::broadcast;

    fn session(cluster: Cluster) -> Arc<SessionHandle> {
        let (viz_tx, _) = broadcast::channel(16);
        Arc::new(SessionHandle::new("owner1".to_string(), cluster, viz_tx))
    }

    async fn armed_session(cluster: Cluster) -> Arc<SessionHandle> {
        let s = session(cluster);
        let config: BotConfig = serde_json::from_value(serde_json::json!({
            "cluster": cluster.as_str(), "mode": "snipe",
        }))
        .unwrap();
        s.start(config).await;
        let mut state = s.lock().await;
        state.pending_action = Some(PendingAction::SignAndBundle(SignAndBundleAction {
            reason: "test".to_string(),
            unsigned_txs_base64: vec![],
            trigger_signature: "sig".to_string(),
            source: ActionSource::Pumpfun,
            target_mint: None,
            needs_unsigned_txs: false,
        }));
        drop(state);
        s
    }

    fn signed_transfer_b64(to: &Pubkey, lamports: u64) -> String {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), to, lamports);
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );
        let vtx = VersionedTransaction::from(tx);
        BASE64.encode(bincode::serialize(&vtx).unwrap())
    }

    #[tokio::test]
    async fn test_devnet_prepare_refused() {
        let s = armed_session(Cluster::Devnet).await;
        let engine = MockEngine::default();
        let tx = signed_transfer_b64(&Pubkey::new_unique(), 1000);

        let result = prepare(&s, &engine, Cluster::Devnet, &[tx]).await;
        assert!(matches!(result, Err(Error::MainnetOnly)));

        let state = s.lock().await;
        assert!(state.bundles.is_empty());
        assert!(state.pending_action.is_some(), "pending action unchanged");
    }

    #[tokio::test]
    async fn test_prepare_records_bundle_and_clears_pending() {
        let tip_account = Pubkey::new_unique();
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::with_tip_accounts(vec![tip_account.to_string()]);

        let swap_tx = signed_transfer_b64(&Pubkey::new_unique(), 5000);
        let tip_tx = signed_transfer_b64(&tip_account, 10_000);

        let outcome = prepare(&s, &engine, Cluster::Mainnet, &[swap_tx, tip_tx])
            .await
            .unwrap();
        assert_eq!(outcome.simulation["summary"], "succeeded");

        let state = s.lock().await;
        assert_eq!(state.bundles.len(), 1);
        assert_eq!(state.prepared_bundles.len(), 1);
        let record = &state.bundles[&outcome.local_id];
        assert_eq!(record.state, BundleState::Prepared);
        assert_eq!(record.signatures.len(), 2);
        assert_eq!(record.simulation.as_ref().unwrap()["summary"], "succeeded");
        assert!(state.pending_action.is_none(), "prepare clears pending");
        // Tip-last satisfied: no warning
        assert!(!state
            .logs
            .snapshot()
            .iter()
            .any(|l| l.message.contains("no tip detected")));
    }

    #[tokio::test]
    async fn test_prepare_warns_when_tip_missing() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::with_tip_accounts(vec![Pubkey::new_unique().to_string()]);
        let tx = signed_transfer_b64(&Pubkey::new_unique(), 5000);

        prepare(&s, &engine, Cluster::Mainnet, &[tx]).await.unwrap();

        let state = s.lock().await;
        assert!(state
            .logs
            .snapshot()
            .iter()
            .any(|l| l.message.contains("no tip detected")));
    }

    #[tokio::test]
    async fn test_prepare_continues_when_tip_lookup_fails() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::default();
        *engine.tip_accounts.lock().unwrap() = Err(Error::BlockEngine("down".to_string()));
        let tx = signed_transfer_b64(&Pubkey::new_unique(), 5000);

        let outcome = prepare(&s, &engine, Cluster::Mainnet, &[tx]).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_rejects_oversized_bundle() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::default();
        let txs: Vec<String> = (0..6)
            .map(|_| signed_transfer_b64(&Pubkey::new_unique(), 1))
            .collect();

        let result = prepare(&s, &engine, Cluster::Mainnet, &txs).await;
        assert!(matches!(result, Err(Error::BundleTooLarge { got: 6, .. })));
    }

    #[tokio::test]
    async fn test_submit_transitions_and_polls_once() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::default();
        let tx = signed_transfer_b64(&Pubkey::new_unique(), 5000);

        let prepared = prepare(&s, &engine, Cluster::Mainnet, &[tx]).await.unwrap();
        let outcome = submit(&s, &engine, Cluster::Mainnet, &prepared.local_id)
            .await
            .unwrap();
        assert_eq!(outcome.send_result, serde_json::json!("remote-bundle-id"));

        let state = s.lock().await;
        let record = &state.bundles[&prepared.local_id];
        assert_eq!(record.state, BundleState::Submitted);
        assert_eq!(record.remote_id.as_deref(), Some("remote-bundle-id"));
        assert!(record.jito_status.is_some());
    }

    #[tokio::test]
    async fn test_submit_unknown_local_id() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::default();
        let result = submit(&s, &engine, Cluster::Mainnet, "nope").await;
        assert!(matches!(result, Err(Error::BundleNotFound(_))));
    }

    #[tokio::test]
    async fn test_submit_devnet_refused() {
        let s = armed_session(Cluster::Devnet).await;
        let engine = MockEngine::default();
        let result = submit(&s, &engine, Cluster::Devnet, "any").await;
        assert!(matches!(result, Err(Error::MainnetOnly)));
    }

    #[tokio::test]
    async fn test_submit_failure_marks_record_error() {
        let s = armed_session(Cluster::Mainnet).await;
        let engine = MockEngine::default();
        let tx = signed_transfer_b64(&Pubkey::new_unique(), 5000);
        let prepared = prepare(&s, &engine, Cluster::Mainnet, &[tx]).await.unwrap();

        *engine.send_result.lock().unwrap() = Err(Error::BlockEngine("rejected".to_string()));
        let result = submit(&s, &engine, Cluster::Mainnet, &prepared.local_id).await;
        assert!(result.is_err());

        let state = s.lock().await;
        let record = &state.bundles[&prepared.local_id];
        assert_eq!(record.state, BundleState::Error);
        assert!(record.error.as_ref().unwrap().contains("rejected"));
    }
}
