//! Cheap log-text predicates
//!
//! These run on every notification before any RPC is spent; they are
//! intentionally loose pre-filters, not correctness gates. Patterns are
//! compiled once at first use.

use std::sync::OnceLock;

use regex::Regex;

use super::SignalSource;

fn pool_init_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)initialize2|initialize").expect("valid regex"))
}

fn launchpad_activity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)buy|sell|create|initialize").expect("valid regex"))
}

fn create_instruction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)instruction:\s*create").expect("valid regex"))
}

/// AMM topic: does any log line look like a pool initialization?
pub fn is_pool_init(logs: &[String]) -> bool {
    logs.iter().any(|l| pool_init_re().is_match(l))
}

/// Launchpad topic: does any log line look like trade/create activity?
pub fn is_launchpad_activity(logs: &[String]) -> bool {
    logs.iter().any(|l| launchpad_activity_re().is_match(l))
}

/// Does any log line carry an explicit create instruction marker?
/// Used by the auto-discovery filter, not the stream pre-filter.
pub fn is_create_from_logs(logs: &[String]) -> bool {
    logs.iter().any(|l| create_instruction_re().is_match(l))
}

/// Per-topic pre-filter applied before a signal reaches the router
pub fn qualifies(source: SignalSource, logs: &[String]) -> bool {
    match source {
        SignalSource::Raydium => is_pool_init(logs),
        SignalSource::Pumpfun => is_launchpad_activity(logs),
    }
}
