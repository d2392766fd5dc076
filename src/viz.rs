//! Log-line classification for the visualization stream
//!
//! Classification is a display policy, not a contract: it maps a free-form
//! log message to the component most likely to have produced it, so the UI
//! can group live activity. Output feeds observability only.

use serde::Serialize;

/// Component tag inferred from a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VizComponent {
    HeliusWs,
    SolanaRpc,
    Pumpfun,
    Raydium,
    Jupiter,
    Jito,
    Pumpportal,
    TxBuilder,
    BackendApi,
    Other,
}

/// A classified log event published to viz subscribers
#[derive(Debug, Clone, Serialize)]
pub struct VizEvent {
    pub component: VizComponent,
    pub message: String,
}

/// Classify a log message by cheap substring heuristics.
///
/// First match wins; order goes from the most specific vocabulary to the
/// most generic so "jupiter quote failed, falling back to raydium" lands
/// on jupiter.
pub fn classify(message: &str) -> VizComponent {
    let m = message.to_ascii_lowercase();

    if m.contains("logssubscribe") || m.contains("websocket") || m.contains("helius") {
        VizComponent::HeliusWs
    } else if m.contains("pumpportal") || m.contains("trade-local") {
        VizComponent::Pumpportal
    } else if m.contains("jupiter") || m.contains("aggregator quote") {
        VizComponent::Jupiter
    } else if m.contains("jito") || m.contains("bundle") || m.contains("tip account") {
        VizComponent::Jito
    } else if m.contains("pump.fun") || m.contains("pumpfun") || m.contains("bonding curve") {
        VizComponent::Pumpfun
    } else if m.contains("raydium") || m.contains("pool init") || m.contains("amm") {
        VizComponent::Raydium
    } else if m.contains("unsigned tx") || m.contains("blockhash") || m.contains("materializ") {
        VizComponent::TxBuilder
    } else if m.contains("getaccountinfo")
        || m.contains("gettransaction")
        || m.contains("rpc")
        || m.contains("commitment")
    {
        VizComponent::SolanaRpc
    } else if m.contains("session") || m.contains("prepare") || m.contains("submit") {
        VizComponent::BackendApi
    } else {
        VizComponent::Other
    }
}
