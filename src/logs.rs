//! Bounded log rings for session and cluster visibility
//!
//! The UI reads these rings through the session view; they are append-only
//! with oldest-first eviction at a fixed cap. Lines also flow through
//! `tracing` so operators get the same text in process logs.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum retained lines per ring
pub const LOG_RING_CAP: usize = 500;

/// Severity of a user-visible log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A single user-visible log line
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Append-with-trim ring of log lines (cap 500)
#[derive(Debug, Default)]
pub struct LogRing {
    lines: VecDeque<LogLine>,
}

impl LogRing {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(64),
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.lines.push_back(LogLine {
            at: Utc::now(),
            level,
            message: message.into(),
        });
        while self.lines.len() > LOG_RING_CAP {
            self.lines.pop_front();
        }
    }

    /// Snapshot for the session view
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_trims_oldest_first() {
        let mut ring = LogRing::new();
        for i in 0..LOG_RING_CAP + 25 {
            ring.push(LogLevel::Info, format!("line {}", i));
        }
        assert_eq!(ring.len(), LOG_RING_CAP);
        let snap = ring.snapshot();
        assert_eq!(snap.first().unwrap().message, "line 25");
        assert_eq!(
            snap.last().unwrap().message,
            format!("line {}", LOG_RING_CAP + 24)
        );
    }

    #[test]
    fn test_empty_ring() {
        let ring = LogRing::new();
        assert!(ring.is_empty());
        assert!(ring.snapshot().is_empty());
    }
}
