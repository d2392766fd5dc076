//! Backend facade
//!
//! The surface the HTTP/SSE edge consumes: session start/stop, views,
//! materialization, bundle prepare/submit, and the viz event stream. The
//! backend never sees a private key; signed transactions arrive from the
//! browser wallet fully formed.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::adapters::http_venues::{JupiterAdapter, TradeLocalHttpAdapter};
use crate::adapters::rpc::SolanaRpcAdapter;
use crate::adapters::swap::PlaceholderSwapAdapter;
use crate::adapters::{BlockEngineApi, ClusterRpcClient, Commitment};
use crate::bundle;
use crate::bundle::block_engine::BlockEngineClient;
use crate::cluster::Cluster;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::materializer::{self, VenueAdapters};
use crate::session::registry::Registry;
use crate::session::state::SessionView;
use crate::session::types::{BotConfig, Mode};
use crate::stream::multiplexer;
use crate::viz::VizEvent;
use crate::volume;

/// The keyless sniper backend core
pub struct Backend {
    config: AppConfig,
    registry: Registry,
    rpc_mainnet: Arc<dyn ClusterRpcClient>,
    rpc_devnet: Arc<dyn ClusterRpcClient>,
    engine: Arc<dyn BlockEngineApi>,
    venues: VenueAdapters,
}

impl Backend {
    /// Production wiring from process configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        let rpc_mainnet: Arc<dyn ClusterRpcClient> = Arc::new(SolanaRpcAdapter::new(
            config.rpc.http(Cluster::Mainnet),
            config.rpc.timeout_ms,
        ));
        let rpc_devnet: Arc<dyn ClusterRpcClient> = Arc::new(SolanaRpcAdapter::new(
            config.rpc.http(Cluster::Devnet),
            config.rpc.timeout_ms,
        ));
        let engine: Arc<dyn BlockEngineApi> =
            Arc::new(BlockEngineClient::new(config.block_engine.clone())?);
        let venues = VenueAdapters {
            swap: Arc::new(PlaceholderSwapAdapter::new()),
            aggregator: Arc::new(JupiterAdapter::new()?),
            trade_local: Arc::new(TradeLocalHttpAdapter::new()?),
        };
        Ok(Self::with_adapters(
            config,
            rpc_mainnet,
            rpc_devnet,
            engine,
            venues,
        ))
    }

    /// Wiring with injected adapters (tests, alternative deployments)
    pub fn with_adapters(
        config: AppConfig,
        rpc_mainnet: Arc<dyn ClusterRpcClient>,
        rpc_devnet: Arc<dyn ClusterRpcClient>,
        engine: Arc<dyn BlockEngineApi>,
        venues: VenueAdapters,
    ) -> Self {
        let registry = Registry::new(config.pipeline.rpc_max_inflight);
        Self {
            config,
            registry,
            rpc_mainnet,
            rpc_devnet,
            engine,
            venues,
        }
    }

    fn rpc(&self, cluster: Cluster) -> Arc<dyn ClusterRpcClient> {
        match cluster {
            Cluster::Mainnet => self.rpc_mainnet.clone(),
            Cluster::Devnet => self.rpc_devnet.clone(),
        }
    }

    /// Start (or restart) a session for `owner` with a fresh config
    pub async fn start_session(&self, owner: &str, config: BotConfig) -> Result<()> {
        let cluster = config.cluster;
        let mode = config.mode;
        let runtime = self.registry.runtime(cluster);
        let session = runtime.session(owner);
        let snap = session.start(config).await;
        info!(owner, cluster = %cluster, "session started in {:?} mode", mode);

        match mode {
            Mode::Snipe => {
                let rpc = self.rpc(cluster);
                multiplexer::ensure_subscription(
                    &runtime,
                    &rpc,
                    self.config.rpc.ws(cluster),
                    &self.config.pipeline,
                )
                .await?;
            }
            Mode::Volume => {
                volume::spawn(session, snap);
            }
        }
        Ok(())
    }

    /// Stop a session; closes the cluster stream when it was the last one
    pub async fn stop_session(&self, cluster: Cluster, owner: &str) -> Result<()> {
        let runtime = self.registry.runtime(cluster);
        if let Some(session) = runtime.session_if_exists(owner) {
            session.stop().await;
        }
        multiplexer::teardown_if_idle(&runtime).await;
        Ok(())
    }

    /// Session view for the edge, cluster logs included
    pub async fn session_view(&self, cluster: Cluster, owner: &str) -> SessionView {
        let runtime = self.registry.runtime(cluster);
        let mut view = match runtime.session_if_exists(owner) {
            Some(session) => session.view().await,
            None => SessionView {
                running: false,
                pending_action: None,
                bundles: vec![],
                session_logs: vec![],
                cluster_logs: vec![],
            },
        };
        view.cluster_logs = runtime.cluster_logs_snapshot().await;
        view
    }

    /// Build the unsigned transactions for the current pending action
    pub async fn materialize(&self, cluster: Cluster, owner: &str) -> Result<Vec<String>> {
        let runtime = self.registry.runtime(cluster);
        let session = runtime
            .session_if_exists(owner)
            .ok_or_else(|| Error::SessionNotRunning(owner.to_string()))?;
        materializer::materialize(
            &session,
            self.rpc(cluster).as_ref(),
            &runtime.rpc_sem,
            self.engine.as_ref(),
            &self.venues,
        )
        .await
    }

    /// Validate, simulate and record a signed bundle
    pub async fn prepare_bundle(
        &self,
        cluster: Cluster,
        owner: &str,
        signed_txs_base64: &[String],
    ) -> Result<bundle::PrepareOutcome> {
        let runtime = self.registry.runtime(cluster);
        let session = runtime.session(owner);
        bundle::prepare(&session, self.engine.as_ref(), cluster, signed_txs_base64).await
    }

    /// Submit a prepared bundle to the block engine
    pub async fn submit_bundle(
        &self,
        cluster: Cluster,
        owner: &str,
        local_id: &str,
    ) -> Result<bundle::SubmitOutcome> {
        let runtime = self.registry.runtime(cluster);
        let session = runtime
            .session_if_exists(owner)
            .ok_or_else(|| Error::BundleNotFound(local_id.to_string()))?;
        bundle::submit(&session, self.engine.as_ref(), cluster, local_id).await
    }

    /// Stream of classified log events for the viz UI
    pub fn subscribe_viz(&self) -> broadcast::Receiver<VizEvent> {
        self.registry.subscribe_viz()
    }

    /// Verify the RPC endpoints answer before serving traffic
    pub async fn health_check(&self) -> Result<()> {
        for cluster in Cluster::ALL {
            self.rpc(cluster)
                .get_latest_blockhash(Commitment::Processed)
                .await
                .map_err(|e| Error::Rpc(format!("{} health check failed: {}", cluster, e)))?;
        }
        Ok(())
    }

    /// Deterministic teardown: stop every session and close both streams
    pub async fn shutdown(&self) {
        for cluster in Cluster::ALL {
            let runtime = self.registry.runtime(cluster);
            for session in runtime.session_handles() {
                session.stop().await;
            }
            multiplexer::teardown_if_idle(&runtime).await;
        }
        info!("backend shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::testing::MockEngine;
    use crate::discovery::testing::MockRpc;
    use crate::materializer::testing::{MockAggregator, MockTradeLocal};
    use std::time::Duration;

    fn test_backend() -> Backend {
        let venues = VenueAdapters {
            swap: Arc::new(PlaceholderSwapAdapter::new()),
            aggregator: Arc::new(MockAggregator::default()),
            trade_local: Arc::new(MockTradeLocal::default()),
        };
        Backend::with_adapters(
            AppConfig::default(),
            Arc::new(MockRpc::default()),
            Arc::new(MockRpc::default()),
            Arc::new(MockEngine::default()),
            venues,
        )
    }

    fn volume_config() -> BotConfig {
        serde_json::from_value(serde_json::json!({
            "cluster": "mainnet", "mode": "volume",
            "volume": { "enabled": true, "intervalSecs": 5, "tokenMint": "TokenT" },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_volume_session_stages_action_then_materializes() {
        let backend = test_backend();
        backend
            .start_session("owner1", volume_config())
            .await
            .unwrap();

        // The timer arms on its first tick
        let mut armed = false;
        for _ in 0..50 {
            let view = backend.session_view(Cluster::Mainnet, "owner1").await;
            if view.pending_action.is_some() {
                armed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(armed, "volume timer should stage an action");

        let txs = backend.materialize(Cluster::Mainnet, "owner1").await.unwrap();
        assert!(!txs.is_empty());

        let view = backend.session_view(Cluster::Mainnet, "owner1").await;
        let action = view.pending_action.unwrap();
        assert!(!action.sign_and_bundle().needs_unsigned_txs);

        backend.stop_session(Cluster::Mainnet, "owner1").await.unwrap();
        let view = backend.session_view(Cluster::Mainnet, "owner1").await;
        assert!(!view.running);
        assert!(view.pending_action.is_none());
    }

    #[tokio::test]
    async fn test_view_for_unknown_session_is_stopped() {
        let backend = test_backend();
        let view = backend.session_view(Cluster::Devnet, "nobody").await;
        assert!(!view.running);
        assert!(view.bundles.is_empty());
    }

    #[tokio::test]
    async fn test_materialize_without_session_errors() {
        let backend = test_backend();
        let result = backend.materialize(Cluster::Mainnet, "nobody").await;
        assert!(matches!(result, Err(Error::SessionNotRunning(_))));
    }

    #[tokio::test]
    async fn test_devnet_prepare_refused_through_facade() {
        let backend = test_backend();
        let result = backend
            .prepare_bundle(Cluster::Devnet, "owner1", &["AAAA".to_string()])
            .await;
        assert!(matches!(result, Err(Error::MainnetOnly)));
    }
}
