//! Per-cluster runtime containers
//!
//! A `ClusterRuntime` is the flat owner of everything cluster-scoped: the
//! session index, the signature dedup set, the cluster log ring, the RPC
//! semaphore and the WebSocket handle. Sessions carry only the cluster tag,
//! never a pointer back at the runtime.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{error, info, warn};

use super::state::SessionHandle;
use crate::cluster::Cluster;
use crate::logs::{LogLevel, LogLine, LogRing};
use crate::stream::multiplexer::WsHandle;
use crate::viz::{classify, VizEvent};

/// Capacity of the viz broadcast channel
const VIZ_CHANNEL_CAP: usize = 1024;

/// Cluster-scoped runtime state
pub struct ClusterRuntime {
    pub cluster: Cluster,
    sessions: DashMap<String, Arc<SessionHandle>>,
    pub dedup: Mutex<crate::stream::dedup::SignatureDedup>,
    cluster_logs: Mutex<LogRing>,
    /// Bounds in-flight blockchain RPCs during discovery bursts
    pub rpc_sem: Arc<Semaphore>,
    /// Present while the log stream is open
    pub ws: Mutex<Option<WsHandle>>,
    viz_tx: broadcast::Sender<VizEvent>,
}

impl ClusterRuntime {
    pub fn new(
        cluster: Cluster,
        rpc_max_inflight: usize,
        viz_tx: broadcast::Sender<VizEvent>,
    ) -> Self {
        Self {
            cluster,
            sessions: DashMap::new(),
            dedup: Mutex::new(crate::stream::dedup::SignatureDedup::new()),
            cluster_logs: Mutex::new(LogRing::new()),
            rpc_sem: Arc::new(Semaphore::new(rpc_max_inflight)),
            ws: Mutex::new(None),
            viz_tx,
        }
    }

    /// Lookup-or-create is atomic; sessions are never destroyed
    pub fn session(&self, owner: &str) -> Arc<SessionHandle> {
        self.sessions
            .entry(owner.to_string())
            .or_insert_with(|| {
                Arc::new(SessionHandle::new(
                    owner.to_string(),
                    self.cluster,
                    self.viz_tx.clone(),
                ))
            })
            .clone()
    }

    /// Existing session, if any (no creation)
    pub fn session_if_exists(&self, owner: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(owner).map(|s| s.clone())
    }

    /// Snapshot of all session handles (shard locks released before await)
    pub fn session_handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Does any session in this cluster still run?
    pub async fn any_running(&self) -> bool {
        for session in self.session_handles() {
            if session.is_running().await {
                return true;
            }
        }
        false
    }

    /// Append a cluster-level log line (mirrored to tracing and viz)
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!(cluster = %self.cluster, "{}", message),
            LogLevel::Warn => warn!(cluster = %self.cluster, "{}", message),
            LogLevel::Error => error!(cluster = %self.cluster, "{}", message),
        }
        let _ = self.viz_tx.send(VizEvent {
            component: classify(&message),
            message: message.clone(),
        });
        self.cluster_logs.lock().await.push(level, message);
    }

    pub async fn cluster_logs_snapshot(&self) -> Vec<LogLine> {
        self.cluster_logs.lock().await.snapshot()
    }
}

/// All cluster runtimes of the process
pub struct Registry {
    mainnet: Arc<ClusterRuntime>,
    devnet: Arc<ClusterRuntime>,
    viz_tx: broadcast::Sender<VizEvent>,
}

impl Registry {
    pub fn new(rpc_max_inflight: usize) -> Self {
        let (viz_tx, _) = broadcast::channel(VIZ_CHANNEL_CAP);
        Self {
            mainnet: Arc::new(ClusterRuntime::new(
                Cluster::Mainnet,
                rpc_max_inflight,
                viz_tx.clone(),
            )),
            devnet: Arc::new(ClusterRuntime::new(
                Cluster::Devnet,
                rpc_max_inflight,
                viz_tx.clone(),
            )),
            viz_tx,
        }
    }

    pub fn runtime(&self, cluster: Cluster) -> Arc<ClusterRuntime> {
        match cluster {
            Cluster::Mainnet => self.mainnet.clone(),
            Cluster::Devnet => self.devnet.clone(),
        }
    }

    pub fn subscribe_viz(&self) -> broadcast::Receiver<VizEvent> {
        self.viz_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Mode;

    #[tokio::test]
    async fn test_session_lookup_or_create() {
        let registry = Registry::new(2);
        let runtime = registry.runtime(Cluster::Mainnet);

        let a = runtime.session("owner1");
        let b = runtime.session("owner1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(runtime.session_if_exists("owner2").is_none());
    }

    #[tokio::test]
    async fn test_any_running_tracks_session_state() {
        let registry = Registry::new(2);
        let runtime = registry.runtime(Cluster::Devnet);
        assert!(!runtime.any_running().await);

        let session = runtime.session("owner1");
        let config: crate::session::types::BotConfig = serde_json::from_value(serde_json::json!({
            "cluster": "devnet",
            "mode": "snipe",
        }))
        .unwrap();
        assert_eq!(config.mode, Mode::Snipe);
        session.start(config).await;
        assert!(runtime.any_running().await);

        session.stop().await;
        assert!(!runtime.any_running().await);
    }

    #[tokio::test]
    async fn test_clusters_are_disjoint() {
        let registry = Registry::new(2);
        registry.runtime(Cluster::Mainnet).session("owner1");
        assert!(registry
            .runtime(Cluster::Devnet)
            .session_if_exists("owner1")
            .is_none());
    }
}
