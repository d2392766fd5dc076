//! Session data model
//!
//! Per-wallet configuration snapshots, the pending-action slot, bundle
//! records and the auto-discovery bookkeeping. `BotConfig` arrives from the
//! edge as camelCase JSON and is immutable for the lifetime of a run; a
//! restart replaces the whole snapshot and bumps the session epoch.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::stream::SignalSource;

/// Milliseconds since the unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Trading mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Snipe,
    Volume,
}

/// Which side of the launchpad → AMM migration to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpFunPhase {
    Pre,
    Post,
}

/// How snipe targets are selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnipeTargetMode {
    List,
    Auto,
}

/// Auto-discovery filter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSnipeConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_min_signals")]
    pub min_signals_in_window: u32,
    #[serde(default = "default_min_payers")]
    pub min_unique_fee_payers_in_window: u32,
    #[serde(default = "default_max_tx_age_secs")]
    pub max_tx_age_secs: u64,
    #[serde(default = "default_true")]
    pub require_mint_authority_disabled: bool,
    #[serde(default = "default_true")]
    pub require_freeze_authority_disabled: bool,
    #[serde(default = "default_max_top1_pct")]
    pub max_top1_holder_pct: f64,
    #[serde(default = "default_max_top10_pct")]
    pub max_top10_holder_pct: f64,
    #[serde(default)]
    pub allow_token_2022: bool,
}

impl Default for AutoSnipeConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            min_signals_in_window: default_min_signals(),
            min_unique_fee_payers_in_window: default_min_payers(),
            max_tx_age_secs: default_max_tx_age_secs(),
            require_mint_authority_disabled: true,
            require_freeze_authority_disabled: true,
            max_top1_holder_pct: default_max_top1_pct(),
            max_top10_holder_pct: default_max_top10_pct(),
            allow_token_2022: false,
        }
    }
}

/// Volume-mode parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_volume_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub token_mint: Option<String>,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default)]
    pub roundtrip: bool,
}

/// Immutable per-run session configuration, provided by the edge at start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    pub cluster: Cluster,
    pub mode: Mode,
    #[serde(default = "default_phase")]
    pub pump_fun_phase: PumpFunPhase,
    #[serde(default = "default_target_mode")]
    pub snipe_target_mode: SnipeTargetMode,
    #[serde(default)]
    pub auto_snipe: AutoSnipeConfig,
    #[serde(default)]
    pub mev_enabled: bool,
    #[serde(default = "default_buy_amount_sol")]
    pub buy_amount_sol: f64,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub snipe_list: Vec<String>,
    // Exit-management knobs; carried in the snapshot for the UI, the core
    // does not act on them.
    #[serde(default)]
    pub min_liquidity_sol: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default)]
    pub auto_sell_enabled: bool,
}

fn default_window_secs() -> u64 {
    8
}

fn default_min_signals() -> u32 {
    3
}

fn default_min_payers() -> u32 {
    3
}

fn default_max_tx_age_secs() -> u64 {
    20
}

fn default_max_top1_pct() -> f64 {
    20.0
}

fn default_max_top10_pct() -> f64 {
    60.0
}

fn default_volume_interval_secs() -> u64 {
    10
}

fn default_slippage_bps() -> u32 {
    250
}

fn default_phase() -> PumpFunPhase {
    PumpFunPhase::Pre
}

fn default_target_mode() -> SnipeTargetMode {
    SnipeTargetMode::Auto
}

fn default_buy_amount_sol() -> f64 {
    0.05
}

fn default_take_profit_pct() -> f64 {
    50.0
}

fn default_stop_loss_pct() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

/// What produced a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionSource {
    Raydium,
    Pumpfun,
    VolumeTimer,
}

impl From<SignalSource> for ActionSource {
    fn from(src: SignalSource) -> Self {
        match src {
            SignalSource::Raydium => ActionSource::Raydium,
            SignalSource::Pumpfun => ActionSource::Pumpfun,
        }
    }
}

/// The single staged action a signing client can pick up.
///
/// One variant today; the tag stays so new action kinds get their own
/// record instead of ad-hoc fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingAction {
    SignAndBundle(SignAndBundleAction),
}

impl PendingAction {
    pub fn sign_and_bundle(&self) -> &SignAndBundleAction {
        match self {
            PendingAction::SignAndBundle(a) => a,
        }
    }

    pub fn sign_and_bundle_mut(&mut self) -> &mut SignAndBundleAction {
        match self {
            PendingAction::SignAndBundle(a) => a,
        }
    }
}

/// Sign-and-bundle action record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAndBundleAction {
    pub reason: String,
    /// Empty until materialized
    pub unsigned_txs_base64: Vec<String>,
    pub trigger_signature: String,
    pub source: ActionSource,
    pub target_mint: Option<String>,
    pub needs_unsigned_txs: bool,
}

/// A signed bundle held locally before submission
#[derive(Debug, Clone)]
pub struct PreparedBundle {
    pub local_id: String,
    /// Ordered, base58-encoded signed transactions
    pub signed_txs_base58: Vec<String>,
    pub created_at_ms: u64,
}

/// Bundle record state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleState {
    Prepared,
    Submitted,
    Confirmed,
    Dropped,
    Error,
}

/// Tracked lifecycle of one bundle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatus {
    pub local_id: String,
    pub remote_id: Option<String>,
    pub state: BundleState,
    pub created_at_ms: u64,
    pub last_update_ms: u64,
    /// Remote status payload, stored verbatim
    pub jito_status: Option<serde_json::Value>,
    /// Simulation result, stored verbatim
    pub simulation: Option<serde_json::Value>,
    pub error: Option<String>,
    /// First signature of each transaction, bundle order
    pub signatures: Vec<String>,
}

/// Safety check outcome for a mint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyVerdict {
    pub ok: bool,
    /// Set when `ok == false`
    pub reason: Option<String>,
    pub top1_pct: f64,
    pub top10_pct: f64,
}

impl SafetyVerdict {
    pub fn pass(top1_pct: f64, top10_pct: f64) -> Self {
        Self {
            ok: true,
            reason: None,
            top1_pct,
            top10_pct,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            top1_pct: 0.0,
            top10_pct: 0.0,
        }
    }
}

/// Per-mint momentum window state (session-local)
#[derive(Debug, Clone)]
pub struct MomentumEntry {
    pub first_seen_ms: u64,
    pub created_at_ms: u64,
    pub count: u32,
    pub payers: HashSet<String>,
    pub safety: Option<SafetyVerdict>,
}

impl MomentumEntry {
    pub fn new(now: u64) -> Self {
        Self {
            first_seen_ms: now,
            created_at_ms: now,
            count: 0,
            payers: HashSet::new(),
            safety: None,
        }
    }
}

/// Typed reject reasons from the auto-discovery filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoMint,
    NotNew,
    WindowExpired,
    TooOld,
    Momentum,
    UniquePayers,
    Safety(String),
}

impl RejectReason {
    /// Counter key for the rejects map
    pub fn key(&self) -> String {
        match self {
            RejectReason::NoMint => "noMint".to_string(),
            RejectReason::NotNew => "notNew".to_string(),
            RejectReason::WindowExpired => "windowExpired".to_string(),
            RejectReason::TooOld => "tooOld".to_string(),
            RejectReason::Momentum => "momentum".to_string(),
            RejectReason::UniquePayers => "uniquePayers".to_string(),
            RejectReason::Safety(reason) => reason.clone(),
        }
    }
}

/// Cumulative auto-discovery counters for a session
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoStats {
    pub signals: u64,
    pub tx_ok: u64,
    pub mint_inferred: u64,
    pub safety_ok: u64,
    pub triggered: u64,
    pub rejects: HashMap<String, u64>,
}

impl AutoStats {
    pub fn reject(&mut self, reason: &RejectReason) {
        *self.rejects.entry(reason.key()).or_insert(0) += 1;
    }

    pub fn summary(&self) -> String {
        format!(
            "signals={} txOk={} mintInferred={} safetyOk={} triggered={} rejects={}",
            self.signals,
            self.tx_ok,
            self.mint_inferred,
            self.safety_ok,
            self.triggered,
            self.rejects.values().sum::<u64>()
        )
    }
}
