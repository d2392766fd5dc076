//! Volume timer
//!
//! Per-session loop that stages a volume action at the configured cadence.
//! The driver ticks at 1 Hz for responsiveness; the effective cadence is
//! `max(2, interval_secs)`. The task exits on any epoch change, so a
//! stop/restart can never leave two timers feeding one session.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::session::state::{SessionHandle, Snapshot};
use crate::session::types::{now_ms, ActionSource, Mode, PendingAction, SignAndBundleAction};

/// Floor for the configured cadence
const MIN_INTERVAL_SECS: u64 = 2;

const DRIVER_TICK: Duration = Duration::from_secs(1);

/// What one driver tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Nothing to do this tick
    Slept,
    /// A pending action was staged
    Armed,
    /// The session moved on; the timer must die
    Exit,
}

/// One cadence decision. Extracted from the loop so the logic is testable
/// without wall-clock sleeps.
pub(crate) async fn tick(session: &Arc<SessionHandle>, snap: &Snapshot) -> TickOutcome {
    let mut state = session.lock().await;
    if !state.guard(snap) {
        return TickOutcome::Exit;
    }

    let config = &snap.config;
    if config.mode != Mode::Volume || !config.volume.enabled {
        return TickOutcome::Slept;
    }
    if state.pending_action.is_some() {
        return TickOutcome::Slept;
    }

    let now = now_ms();
    let interval_ms = config.volume.interval_secs.max(MIN_INTERVAL_SECS) * 1000;
    if now.saturating_sub(state.last_volume_action_ms) < interval_ms {
        return TickOutcome::Slept;
    }

    let reason = if config.volume.roundtrip {
        "volume roundtrip (buy + sell)".to_string()
    } else {
        "volume buy".to_string()
    };
    state.pending_action = Some(PendingAction::SignAndBundle(SignAndBundleAction {
        reason,
        unsigned_txs_base64: vec![],
        trigger_signature: format!("volumeTimer:{}", now),
        source: ActionSource::VolumeTimer,
        target_mint: config.volume.token_mint.clone(),
        needs_unsigned_txs: true,
    }));
    state.last_volume_action_ms = now;
    TickOutcome::Armed
}

/// Spawn the timer for a freshly started volume session. Replaces (and
/// aborts) any previous timer of the session.
pub fn spawn(session: Arc<SessionHandle>, snap: Snapshot) {
    let task_session = session.clone();
    let task = tokio::spawn(async move {
        debug!(owner = %task_session.owner, "volume timer started");
        loop {
            if tick(&task_session, &snap).await == TickOutcome::Exit {
                break;
            }
            tokio::time::sleep(DRIVER_TICK).await;
        }
        debug!(owner = %task_session.owner, "volume timer stopped");
    });
    session.set_volume_task(task);
}
