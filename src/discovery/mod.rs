//! Auto-discovery filter
//!
//! Turns raw launchpad signals into armed snipe actions: fetch the
//! originating transaction, infer the traded mint, gate on newness, age and
//! safety, and track a per-mint momentum window of signal count and unique
//! fee payers. Every await is followed by a `(running, config, epoch)`
//! re-check before touching session state; a stale snapshot drops the
//! signal silently.

pub mod safety;
pub mod token_layout;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::adapters::{ClusterRpcClient, Commitment, FetchedTransaction};
use crate::error::{Error, Result};
use crate::logs::LogLevel;
use crate::session::state::{SessionHandle, SessionState, Snapshot};
use crate::session::types::{now_ms, MomentumEntry, RejectReason};
use crate::stream::{heuristics, RawSignal};

/// Generic RPC retry budget
pub(crate) const RPC_RETRY_ATTEMPTS: u32 = 3;
pub(crate) const RPC_RETRY_BASE_MS: u64 = 200;

/// How many leading static account keys the mint probe inspects
const ACCOUNT_PROBE_LIMIT: usize = 25;

/// Run an RPC under the cluster semaphore with exponential backoff on
/// transient errors. Non-retryable errors surface immediately.
pub(crate) async fn rpc_call<T, F, Fut>(
    sem: &Semaphore,
    attempts: u32,
    base_delay_ms: u64,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(base_delay_ms << (attempt - 1))).await;
        }
        let _permit = sem
            .acquire()
            .await
            .map_err(|_| Error::Internal("rpc semaphore closed".to_string()))?;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                debug!("rpc attempt {} failed: {}", attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Internal("rpc retries exhausted".to_string())))
}

/// Fetch a transaction on the two-stage commitment schedule:
/// confirmed (3 attempts, 200 ms base), then finalized (2 attempts, 250 ms).
/// "Not known yet" keeps retrying; transport errors count as a miss.
pub(crate) async fn fetch_transaction(
    rpc: &dyn ClusterRpcClient,
    sem: &Semaphore,
    signature: &str,
) -> Option<FetchedTransaction> {
    let schedule = [
        (Commitment::Confirmed, 3u32, 200u64),
        (Commitment::Finalized, 2u32, 250u64),
    ];

    for (commitment, attempts, base_ms) in schedule {
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(base_ms << (attempt - 1))).await;
            }
            let _permit = sem.acquire().await.ok()?;
            match rpc.get_transaction(signature, commitment).await {
                Ok(Some(tx)) => return Some(tx),
                Ok(None) => {}
                Err(e) => debug!(
                    "getTransaction {} at {} failed: {}",
                    signature,
                    commitment.as_str(),
                    e
                ),
            }
        }
    }
    None
}

/// First mint mentioned in the token balances; trades involve a single
/// relevant token, so a multi-mint transaction keeps the first.
fn infer_mint_from_balances(tx: &FetchedTransaction) -> Option<String> {
    let mut union: Vec<&String> = Vec::new();
    for mint in tx.pre_token_mints.iter().chain(tx.post_token_mints.iter()) {
        if !union.contains(&mint) {
            union.push(mint);
        }
    }
    union.first().map(|m| (*m).to_string())
}

/// Probe the leading static account keys for an initialized mint owned by
/// one of the two token programs.
async fn probe_mint_from_accounts(
    rpc: &dyn ClusterRpcClient,
    sem: &Semaphore,
    account_keys: &[String],
) -> Option<String> {
    let keys: Vec<String> = account_keys.iter().take(ACCOUNT_PROBE_LIMIT).cloned().collect();
    if keys.is_empty() {
        return None;
    }

    let accounts = rpc_call(sem, RPC_RETRY_ATTEMPTS, RPC_RETRY_BASE_MS, || {
        rpc.get_multiple_accounts(&keys)
    })
    .await
    .ok()?;

    for (key, account) in keys.iter().zip(accounts.iter()) {
        let Some(account) = account else { continue };
        if safety::token_program_class(&account.owner).is_none() {
            continue;
        }
        if let Some(layout) = token_layout::parse_mint(&account.data) {
            if layout.is_initialized {
                return Some(key.clone());
            }
        }
    }
    None
}

fn bump_reject(state: &mut SessionState, signature: &str, reason: RejectReason) {
    debug!("signal {} rejected: {}", signature, reason.key());
    state.auto_stats.reject(&reason);
}

/// Evaluate one launchpad signal for a session. Returns the target mint
/// when the momentum window arms; the caller sets the pending action.
pub async fn evaluate(
    session: &Arc<SessionHandle>,
    snap: &Snapshot,
    rpc: &dyn ClusterRpcClient,
    sem: &Semaphore,
    signal: &RawSignal,
) -> Option<String> {
    let cfg = snap.config.auto_snipe.clone();
    let is_create_from_logs = heuristics::is_create_from_logs(&signal.logs);

    {
        let mut state = session.lock().await;
        if !state.guard(snap) {
            return None;
        }
        state.auto_stats.signals += 1;
    }

    let tx = fetch_transaction(rpc, sem, &signal.signature).await;

    let Some(tx) = tx else {
        let mut state = session.lock().await;
        if state.guard(snap) {
            bump_reject(&mut state, &signal.signature, RejectReason::NoMint);
        }
        return None;
    };

    let mut mint = infer_mint_from_balances(&tx);
    if mint.is_none() {
        mint = probe_mint_from_accounts(rpc, sem, &tx.account_keys).await;
    }

    let is_mint_new_in_tx = |m: &str| {
        tx.post_token_mints.iter().any(|x| x == m) && !tx.pre_token_mints.iter().any(|x| x == m)
    };

    // Momentum bookkeeping happens in one critical section
    let cached_safety = {
        let mut state = session.lock().await;
        if !state.guard(snap) {
            return None;
        }
        state.auto_stats.tx_ok += 1;

        let Some(mint) = mint.as_deref() else {
            bump_reject(&mut state, &signal.signature, RejectReason::NoMint);
            return None;
        };
        state.auto_stats.mint_inferred += 1;

        let is_create = is_create_from_logs || is_mint_new_in_tx(mint);
        let now = now_ms();
        let window_ms = cfg.window_secs.saturating_mul(1000);

        enum WindowCheck {
            StartNew,
            Keep,
            RejectNotNew,
            RejectExpired,
        }

        let check = match state.auto_mint_stats.get(mint) {
            // Old mints from before this run never start a window
            None if is_create => WindowCheck::StartNew,
            None => WindowCheck::RejectNotNew,
            Some(entry) if now.saturating_sub(entry.first_seen_ms) > window_ms => {
                if is_create {
                    WindowCheck::StartNew
                } else {
                    WindowCheck::RejectExpired
                }
            }
            Some(_) => WindowCheck::Keep,
        };

        match check {
            WindowCheck::RejectNotNew => {
                bump_reject(&mut state, &signal.signature, RejectReason::NotNew);
                return None;
            }
            WindowCheck::RejectExpired => {
                bump_reject(&mut state, &signal.signature, RejectReason::WindowExpired);
                return None;
            }
            WindowCheck::StartNew => {
                state
                    .auto_mint_stats
                    .insert(mint.to_string(), MomentumEntry::new(now));
            }
            WindowCheck::Keep => {}
        }

        let created_at_ms = state
            .auto_mint_stats
            .get(mint)
            .map(|e| e.created_at_ms)
            .expect("entry just ensured");
        let age_secs = now.saturating_sub(created_at_ms) / 1000;
        if age_secs > cfg.max_tx_age_secs {
            bump_reject(&mut state, &signal.signature, RejectReason::TooOld);
            return None;
        }

        let payer = tx.account_keys.first().cloned();
        let entry = state
            .auto_mint_stats
            .get_mut(mint)
            .expect("entry just ensured");
        entry.count += 1;
        if let Some(payer) = payer {
            entry.payers.insert(payer);
        }
        entry.safety.clone()
    };
    let mint = mint.expect("mint inferred above");

    let safety_verdict = match cached_safety {
        Some(verdict) => verdict,
        None => {
            // One safety check per mint per window; memoized after the
            // guard re-check below.
            let verdict = match safety::check_mint_safety(rpc, sem, &mint, &cfg).await {
                Ok(v) => v,
                Err(e) => {
                    debug!("safety check for {} errored: {}", mint, e);
                    let mut state = session.lock().await;
                    if state.guard(snap) {
                        bump_reject(
                            &mut state,
                            &signal.signature,
                            RejectReason::Safety("safety check failed".to_string()),
                        );
                    }
                    return None;
                }
            };

            let mut state = session.lock().await;
            if !state.guard(snap) {
                return None;
            }
            match state.auto_mint_stats.get_mut(&mint) {
                Some(entry) => {
                    if entry.safety.is_none() {
                        entry.safety = Some(verdict);
                    }
                    entry.safety.clone().expect("just memoized")
                }
                None => return None,
            }
        }
    };

    if !safety_verdict.ok {
        let reason = safety_verdict
            .reason
            .unwrap_or_else(|| "safety failed".to_string());
        let mut state = session.lock().await;
        if state.guard(snap) {
            let line = format!("safety reject for {}: {}", mint, reason);
            session.push_log(&mut state, LogLevel::Warn, line);
            bump_reject(&mut state, &signal.signature, RejectReason::Safety(reason));
        }
        return None;
    }

    let mut state = session.lock().await;
    if !state.guard(snap) {
        return None;
    }
    state.auto_stats.safety_ok += 1;

    let (count, unique_payers) = match state.auto_mint_stats.get(&mint) {
        Some(entry) => (entry.count, entry.payers.len() as u32),
        None => return None,
    };
    if count < cfg.min_signals_in_window {
        bump_reject(&mut state, &signal.signature, RejectReason::Momentum);
        return None;
    }
    if unique_payers < cfg.min_unique_fee_payers_in_window {
        bump_reject(&mut state, &signal.signature, RejectReason::UniquePayers);
        return None;
    }

    state.auto_stats.triggered += 1;
    Some(mint)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Programmable RPC double shared by discovery, router and
    //! materializer tests

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::adapters::{
        AccountSnapshot, ClusterRpcClient, Commitment, FetchedTransaction, SignatureInfo,
        TokenSupply,
    };
    use crate::error::{Error, Result};

    #[derive(Default)]
    pub(crate) struct MockRpc {
        accounts: Mutex<HashMap<String, AccountSnapshot>>,
        supplies: Mutex<HashMap<String, u64>>,
        holders: Mutex<HashMap<String, Vec<u64>>>,
        txs: Mutex<HashMap<String, FetchedTransaction>>,
        blockhash: Mutex<String>,
    }

    impl MockRpc {
        pub fn put_mint_account(&self, mint: &str, data: Vec<u8>, extended: bool) {
            let owner = if extended {
                spl_token_2022::ID.to_string()
            } else {
                spl_token::ID.to_string()
            };
            self.accounts.lock().unwrap().insert(
                mint.to_string(),
                AccountSnapshot {
                    owner,
                    data,
                    lamports: 1_000_000,
                },
            );
        }

        pub fn put_supply(&self, mint: &str, amount: u64) {
            self.supplies.lock().unwrap().insert(mint.to_string(), amount);
        }

        pub fn put_holders(&self, mint: &str, holders: Vec<u64>) {
            self.holders.lock().unwrap().insert(mint.to_string(), holders);
        }

        pub fn put_tx(&self, signature: &str, tx: FetchedTransaction) {
            self.txs.lock().unwrap().insert(signature.to_string(), tx);
        }

        pub fn set_blockhash(&self, hash: &str) {
            *self.blockhash.lock().unwrap() = hash.to_string();
        }
    }

    #[async_trait]
    impl ClusterRpcClient for MockRpc {
        async fn get_latest_blockhash(&self, _commitment: Commitment) -> Result<String> {
            let hash = self.blockhash.lock().unwrap().clone();
            if hash.is_empty() {
                Ok(solana_sdk::hash::Hash::new_unique().to_string())
            } else {
                Ok(hash)
            }
        }

        async fn get_multiple_accounts(
            &self,
            pubkeys: &[String],
        ) -> Result<Vec<Option<AccountSnapshot>>> {
            let accounts = self.accounts.lock().unwrap();
            Ok(pubkeys.iter().map(|k| accounts.get(k).cloned()).collect())
        }

        async fn get_account_info(
            &self,
            pubkey: &str,
            _commitment: Commitment,
        ) -> Result<Option<AccountSnapshot>> {
            Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
        }

        async fn get_transaction(
            &self,
            signature: &str,
            _commitment: Commitment,
        ) -> Result<Option<FetchedTransaction>> {
            Ok(self.txs.lock().unwrap().get(signature).cloned())
        }

        async fn get_token_supply(&self, mint: &str) -> Result<TokenSupply> {
            self.supplies
                .lock()
                .unwrap()
                .get(mint)
                .map(|&amount| TokenSupply { amount, decimals: 6 })
                .ok_or_else(|| Error::Rpc("no supply".to_string()))
        }

        async fn get_token_largest_accounts(&self, mint: &str) -> Result<Vec<u64>> {
            Ok(self
                .holders
                .lock()
                .unwrap()
                .get(mint)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_signatures_for_address(
            &self,
            _pubkey: &str,
            _limit: usize,
            _commitment: Commitment,
        ) -> Result<Vec<SignatureInfo>> {
            Ok(vec![])
        }

        async fn send_raw_transaction(&self, _bytes: &[u8]) -> Result<String> {
            Err(Error::Rpc("not supported in mock".to_string()))
        }
    }
}
