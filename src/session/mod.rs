//! Session lifecycle, registry and data model

pub mod registry;
pub mod state;
pub mod types;

pub use registry::{ClusterRuntime, Registry};
pub use state::{SessionHandle, SessionState, SessionView, Snapshot};
pub use types::{BotConfig, Mode, PendingAction, PumpFunPhase, SnipeTargetMode};
