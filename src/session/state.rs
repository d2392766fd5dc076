//! Per-wallet session state machine
//!
//! A session is created lazily on first reference and never destroyed; it
//! flips between stopped and running. Every start/stop bumps the epoch, and
//! all asynchronous continuations must re-check `(running, config, epoch)`
//! before any observable write. The per-session mutex is what serializes
//! pending-action reads and writes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::types::{
    now_ms, AutoStats, BotConfig, BundleStatus, MomentumEntry, PendingAction, PreparedBundle,
    SignAndBundleAction,
};
use crate::cluster::Cluster;
use crate::logs::{LogLevel, LogLine, LogRing};
use crate::stream::SignalSource;
use crate::viz::{classify, VizEvent};

/// Captured `(config, epoch)` pair for in-flight async work
#[derive(Clone)]
pub struct Snapshot {
    pub config: Arc<BotConfig>,
    pub epoch: u64,
}

/// Mutable session state, guarded by the session mutex
#[derive(Default)]
pub struct SessionState {
    pub running: bool,
    pub config: Option<Arc<BotConfig>>,
    pub epoch: u64,
    pub logs: LogRing,
    pub bundles: HashMap<String, BundleStatus>,
    pub prepared_bundles: HashMap<String, PreparedBundle>,
    pub pending_action: Option<PendingAction>,
    pub auto_mint_stats: HashMap<String, MomentumEntry>,
    pub auto_stats: AutoStats,
    pub last_volume_action_ms: u64,
    pub last_volume_route: Option<String>,
    pub last_heartbeat_ms: HashMap<SignalSource, u64>,
    pub last_empty_list_warn_ms: u64,
}

impl SessionState {
    /// Does the captured snapshot still describe this session?
    pub fn guard(&self, snap: &Snapshot) -> bool {
        self.running
            && self.epoch == snap.epoch
            && self
                .config
                .as_ref()
                .map(|c| Arc::ptr_eq(c, &snap.config))
                .unwrap_or(false)
    }
}

/// View of one session returned to the edge
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub running: bool,
    pub pending_action: Option<PendingAction>,
    pub bundles: Vec<BundleStatus>,
    pub session_logs: Vec<LogLine>,
    pub cluster_logs: Vec<LogLine>,
}

/// Handle to one per-wallet session
pub struct SessionHandle {
    pub owner: String,
    pub cluster: Cluster,
    state: Mutex<SessionState>,
    volume_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    viz_tx: broadcast::Sender<VizEvent>,
}

impl SessionHandle {
    pub fn new(owner: String, cluster: Cluster, viz_tx: broadcast::Sender<VizEvent>) -> Self {
        Self {
            owner,
            cluster,
            state: Mutex::new(SessionState::default()),
            volume_task: std::sync::Mutex::new(None),
            viz_tx,
        }
    }

    /// Acquire the per-session lock
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// `stopped → running`: install the config, reset transient fields and
    /// bump the epoch. Returns the captured snapshot for the caller.
    pub async fn start(&self, config: BotConfig) -> Snapshot {
        let config = Arc::new(config);
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.running = true;
        state.config = Some(config.clone());
        state.pending_action = None;
        state.auto_mint_stats.clear();
        state.auto_stats = AutoStats::default();
        state.last_heartbeat_ms.clear();
        state.last_empty_list_warn_ms = 0;
        state.last_volume_action_ms = 0;
        state.last_volume_route = None;
        let epoch = state.epoch;
        self.push_log(&mut state, LogLevel::Info, "session started");
        Snapshot { config, epoch }
    }

    /// `running → stopped`: clear config and pending action, bump the epoch.
    /// In-flight async work is invalidated by the epoch change.
    pub async fn stop(&self) {
        self.abort_volume_task();
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.running = false;
        state.config = None;
        state.pending_action = None;
        state.auto_mint_stats.clear();
        self.push_log(&mut state, LogLevel::Info, "session stopped");
    }

    /// Capture `(config, epoch)` if the session is running
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let state = self.state.lock().await;
        if !state.running {
            return None;
        }
        let config = state.config.as_ref()?.clone();
        Some(Snapshot {
            config,
            epoch: state.epoch,
        })
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Arm the pending action if the snapshot is still valid and the slot is
    /// free. Returns false when the write was discarded.
    pub async fn try_arm(&self, snap: &Snapshot, action: SignAndBundleAction) -> bool {
        let mut state = self.state.lock().await;
        if !state.guard(snap) || state.pending_action.is_some() {
            return false;
        }
        let line = format!("armed action: {}", action.reason);
        state.pending_action = Some(PendingAction::SignAndBundle(action));
        self.push_log(&mut state, LogLevel::Info, line);
        true
    }

    /// Clear the pending action unconditionally (Prepare, failure paths)
    pub async fn clear_pending(&self) {
        let mut state = self.state.lock().await;
        state.pending_action = None;
    }

    /// Append a session log line (also mirrored to tracing and viz)
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        self.push_log(&mut state, level, message);
    }

    /// Append while already holding the session lock
    pub fn push_log(
        &self,
        state: &mut SessionState,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(owner = %self.owner, cluster = %self.cluster, "{}", message),
            LogLevel::Warn => warn!(owner = %self.owner, cluster = %self.cluster, "{}", message),
            LogLevel::Error => error!(owner = %self.owner, cluster = %self.cluster, "{}", message),
        }
        let _ = self.viz_tx.send(VizEvent {
            component: classify(&message),
            message: message.clone(),
        });
        state.logs.push(level, message);
    }

    /// Snapshot for the edge; cluster logs are filled in by the caller
    pub async fn view(&self) -> SessionView {
        let state = self.state.lock().await;
        let mut bundles: Vec<BundleStatus> = state.bundles.values().cloned().collect();
        bundles.sort_by_key(|b| b.created_at_ms);
        SessionView {
            running: state.running,
            pending_action: state.pending_action.clone(),
            bundles,
            session_logs: state.logs.snapshot(),
            cluster_logs: Vec::new(),
        }
    }

    /// Install the volume-timer task, aborting any previous one
    pub fn set_volume_task(&self, task: JoinHandle<()>) {
        let mut slot = self.volume_task.lock().expect("volume task lock");
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    /// Abort the volume-timer task if one is running
    pub fn abort_volume_task(&self) {
        let mut slot = self.volume_task.lock().expect("volume task lock");
        if let Some(task) = slot.take() {
            task.abort();
        }
    }

    /// 15-second heartbeat throttle per signal source
    pub fn heartbeat_due(state: &mut SessionState, source: SignalSource) -> bool {
        let now = now_ms();
        let last = state.last_heartbeat_ms.entry(source).or_insert(0);
        if now.saturating_sub(*last) >= 15_000 {
            *last = now;
            true
        } else {
            false
        }
    }
}
