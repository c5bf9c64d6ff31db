//! Activity log: the user-facing status/log sink.
//!
//! A bounded ring of timestamped events. Consumers (the control API,
//! tests) read the most recent entries; the oldest are evicted first.
//! Every event is mirrored into `tracing` at the matching level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Number of events kept by default.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.severity,
            self.message
        )
    }
}

/// Cloneable handle to a shared ring of activity events.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    events: Arc<Mutex<VecDeque<ActivityEvent>>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(message.into(), Severity::Info);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(message.into(), Severity::Success);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(message.into(), Severity::Error);
    }

    fn push(&self, message: String, severity: Severity) {
        match severity {
            Severity::Error => error!(target: "alpha_trader::activity", "{message}"),
            Severity::Info | Severity::Success => {
                info!(target: "alpha_trader::activity", severity = %severity, "{message}")
            }
        }

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(ActivityEvent {
            timestamp: Utc::now(),
            message,
            severity,
        });
    }

    /// The latest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let start = events.len().saturating_sub(limit);
        events.iter().skip(start).cloned().collect()
    }

    /// Everything currently held, oldest first.
    pub fn snapshot(&self) -> Vec<ActivityEvent> {
        self.recent(self.capacity)
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether any held event contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|e| e.message.contains(needle))
    }

    /// Number of held events with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
