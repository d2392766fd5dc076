//! Error types for the sniper backend

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper backend
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // WebSocket errors
    #[error("WebSocket connection failed: {0}")]
    WsConnection(String),

    #[error("WebSocket closed")]
    WsClosed,

    #[error("Log subscription failed: {0}")]
    Subscription(String),

    // Session errors
    #[error("Session is not running: {0}")]
    SessionNotRunning(String),

    #[error("Session has no pending action")]
    NoPendingAction,

    #[error("Session epoch changed mid-flight")]
    StaleEpoch,

    // Bundle errors
    #[error("bundles are mainnet-only")]
    MainnetOnly,

    #[error("Bundle not found: {0}")]
    BundleNotFound(String),

    #[error("Bundle cannot contain more than {max} transactions, got {got}")]
    BundleTooLarge { got: usize, max: usize },

    #[error("Empty bundle")]
    EmptyBundle,

    // Block engine errors
    #[error("Block engine error: {0}")]
    BlockEngine(String),

    #[error("Block engine rate limited")]
    BlockEngineRateLimited,

    // Materialization errors
    #[error("Materialization failed: {0}")]
    Materialize(String),

    #[error("All volume routes failed: primary: {primary}; fallback: {fallback}")]
    VolumeRoutesExhausted { primary: String, fallback: String },

    #[error("Swap adapter error: {0}")]
    SwapAdapter(String),

    // Transaction decoding errors
    #[error("Transaction decode failed: {0}")]
    TransactionDecode(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::WsConnection(_)
                | Error::WsClosed
                | Error::BlockEngineRateLimited
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
