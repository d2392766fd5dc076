//! Log-stream multiplexer
//!
//! One WebSocket per cluster, opened when the first snipe session starts
//! and closed when the last one stops. Subscribes to log notifications for
//! the watched programs over raw JSON-RPC, resolves subscription ids back
//! to topics, deduplicates signatures and hands qualifying signals to the
//! dispatcher through a bounded channel. The reader never blocks on
//! per-session work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{heuristics, RawSignal, SignalSource};
use crate::adapters::ClusterRpcClient;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::logs::LogLevel;
use crate::router;
use crate::session::registry::ClusterRuntime;

/// Reconnect backoff ceiling
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Handle to the open log stream of a cluster
pub struct WsHandle {
    shutdown: broadcast::Sender<()>,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl WsHandle {
    /// Stop both tasks; subscription maps die with the reader
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.reader.abort();
        self.dispatcher.abort();
    }
}

#[derive(Deserialize)]
struct LogsNotification {
    params: LogsNotificationParams,
}

#[derive(Deserialize)]
struct LogsNotificationParams {
    result: LogsNotificationResult,
    subscription: u64,
}

#[derive(Deserialize)]
struct LogsNotificationResult {
    value: LogsNotificationValue,
}

#[derive(Deserialize)]
struct LogsNotificationValue {
    #[serde(default)]
    signature: String,
    #[serde(default)]
    logs: Vec<String>,
}

/// Subscription bookkeeping for one connection
#[derive(Default)]
struct SubscriptionMaps {
    /// request id → topic, until the node confirms
    pending: HashMap<u64, SignalSource>,
    /// subscription id → topic
    by_subscription: HashMap<u64, SignalSource>,
    /// topic → subscription id
    by_topic: HashMap<SignalSource, u64>,
}

impl SubscriptionMaps {
    fn confirm(&mut self, request_id: u64, subscription_id: u64) -> Option<SignalSource> {
        let topic = self.pending.remove(&request_id)?;
        self.by_subscription.insert(subscription_id, topic);
        self.by_topic.insert(topic, subscription_id);
        Some(topic)
    }
}

/// Interpret one text frame. Returns a raw notification `(topic, signature,
/// logs)` when the frame is a log notification on a known subscription;
/// malformed frames and unknown subscription ids are dropped silently.
fn handle_ws_text(
    text: &str,
    maps: &mut SubscriptionMaps,
) -> Option<(SignalSource, String, Vec<String>)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;

    // Subscription confirmation: numeric id + numeric result
    if let (Some(request_id), Some(subscription_id)) =
        (value.get("id").and_then(|v| v.as_u64()), value.get("result").and_then(|v| v.as_u64()))
    {
        if let Some(topic) = maps.confirm(request_id, subscription_id) {
            debug!("subscription confirmed: {} → {}", topic, subscription_id);
        }
        return None;
    }

    if value.get("method").and_then(|m| m.as_str()) != Some("logsNotification") {
        return None;
    }

    let notification: LogsNotification = serde_json::from_value(value).ok()?;
    let topic = *maps
        .by_subscription
        .get(&notification.params.subscription)?;

    let signature = notification.params.result.value.signature;
    let logs = notification.params.result.value.logs;
    if signature.is_empty() || logs.is_empty() {
        return None;
    }

    Some((topic, signature, logs))
}

/// Idempotently open the cluster's log stream and start its dispatcher
pub async fn ensure_subscription(
    runtime: &Arc<ClusterRuntime>,
    rpc: &Arc<dyn ClusterRpcClient>,
    ws_url: &str,
    pipeline: &PipelineConfig,
) -> Result<()> {
    let mut slot = runtime.ws.lock().await;
    if slot.is_some() {
        return Ok(());
    }

    url::Url::parse(ws_url).map_err(|e| Error::Config(format!("Invalid WS URL: {}", e)))?;

    let (shutdown, _) = broadcast::channel(1);
    let (signal_tx, mut signal_rx) = mpsc::channel::<RawSignal>(pipeline.channel_capacity);

    let reader = {
        let runtime = runtime.clone();
        let ws_url = ws_url.to_string();
        let pipeline = pipeline.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!(cluster = %runtime.cluster, "log stream shutting down");
                    break;
                }

                match connect_and_stream(&runtime, &ws_url, &pipeline, &signal_tx).await {
                    Ok(()) => {
                        reconnect_attempts = 0;
                    }
                    Err(e) => {
                        error!(cluster = %runtime.cluster, "log stream error: {}", e);
                        reconnect_attempts += 1;
                        if pipeline.max_reconnect_attempts > 0
                            && reconnect_attempts >= pipeline.max_reconnect_attempts
                        {
                            runtime
                                .log(
                                    LogLevel::Error,
                                    "log stream: max reconnect attempts reached",
                                )
                                .await;
                            break;
                        }
                    }
                }

                let delay = Duration::from_millis(
                    pipeline.reconnect_delay_ms << reconnect_attempts.min(5),
                )
                .min(MAX_RECONNECT_DELAY);
                warn!(cluster = %runtime.cluster, "log stream reconnecting in {:?}", delay);
                sleep(delay).await;
            }
        })
    };

    let dispatcher = {
        let runtime = runtime.clone();
        let rpc = rpc.clone();
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                router::dispatch(&runtime, &rpc, signal).await;
            }
        })
    };

    *slot = Some(WsHandle {
        shutdown,
        reader,
        dispatcher,
    });

    runtime
        .log(LogLevel::Info, "log stream subscription established")
        .await;
    Ok(())
}

/// One connection lifetime: subscribe to both topics, pump notifications
async fn connect_and_stream(
    runtime: &Arc<ClusterRuntime>,
    ws_url: &str,
    pipeline: &PipelineConfig,
    signal_tx: &mpsc::Sender<RawSignal>,
) -> Result<()> {
    info!(cluster = %runtime.cluster, "connecting log stream to {}", ws_url);
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| Error::WsConnection(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();
    let mut maps = SubscriptionMaps::default();

    for topic in [SignalSource::Raydium, SignalSource::Pumpfun] {
        let request_id: u64 = rand::thread_rng().gen_range(1..u32::MAX as u64);
        let subscribe = serde_json::json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": "logsSubscribe",
            "params": [
                { "mentions": [topic.program_id()] },
                { "commitment": "processed" }
            ]
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| Error::Subscription(format!("{}: {}", topic, e)))?;
        maps.pending.insert(request_id, topic);
    }

    let mut ping_timer = tokio::time::interval(Duration::from_secs(pipeline.ping_interval_secs));
    ping_timer.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ping_timer.tick() => {
                if let Err(e) = write.send(Message::Ping(vec![])).await {
                    return Err(Error::WsConnection(format!("ping failed: {}", e)));
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some((topic, signature, logs)) = handle_ws_text(&text, &mut maps)
                        else {
                            continue;
                        };

                        // First observation wins
                        if !runtime.dedup.lock().await.insert(&signature) {
                            continue;
                        }

                        if !heuristics::qualifies(topic, &logs) {
                            continue;
                        }

                        let signal = RawSignal { source: topic, signature, logs };
                        if let Err(e) = signal_tx.try_send(signal) {
                            debug!("signal channel full, dropping: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(cluster = %runtime.cluster, "log stream closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::WsConnection(e.to_string())),
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Close the cluster's stream when no session remains running
pub async fn teardown_if_idle(runtime: &Arc<ClusterRuntime>) {
    if runtime.any_running().await {
        return;
    }
    let handle = runtime.ws.lock().await.take();
    if let Some(handle) = handle {
        handle.shutdown();
        runtime
            .log(LogLevel::Info, "log stream closed: no running sessions")
            .await;
    }
}
