//! Bounded in-memory activity log
//!
//! Human-readable record of what the guardian did, newest first.
//! Oldest entries are evicted once capacity is reached.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Number of entries retained
pub const ACTIVITY_LOG_CAPACITY: usize = 10;

/// One immutable log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl std::fmt::Display for ActivityLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Shared handle to the activity ring. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<RwLock<VecDeque<ActivityLogEntry>>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append an entry stamped with the current time
    pub async fn push(&self, message: impl Into<String>) {
        self.push_at(Utc::now(), message).await;
    }

    /// Append an entry with an explicit timestamp
    pub async fn push_at(&self, at: DateTime<Utc>, message: impl Into<String>) {
        let mut entries = self.entries.write().await;
        entries.push_front(ActivityLogEntry {
            at,
            message: message.into(),
        });
        entries.truncate(self.capacity);
    }

    /// Snapshot of the entries, newest first
    pub async fn entries(&self) -> Vec<ActivityLogEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
