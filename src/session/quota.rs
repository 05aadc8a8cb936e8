//! Durable per-session usage counters.
//!
//! Usage is a whitespace word count of each question and answer, not a true
//! token count. The counter only grows within a session's lifetime; purging
//! the session deletes it along with everything else under the prefix.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::{BlobStore, StorageError};

#[derive(Serialize, Deserialize)]
struct UsageRecord {
    token_count: usize,
    ts: i64,
}

/// Reads and updates the cumulative word counter for a session.
pub struct QuotaTracker {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl QuotaTracker {
    /// Create a tracker writing into the given bucket.
    pub fn new(store: Arc<dyn BlobStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    fn usage_key(session_id: &str) -> String {
        format!("{session_id}/usage.json")
    }

    /// Current cumulative count for the session; zero when no record exists.
    pub async fn current(&self, session_id: &str) -> Result<usize, StorageError> {
        match self
            .store
            .get(&self.bucket, &Self::usage_key(session_id))
            .await
        {
            Ok(bytes) => Ok(serde_json::from_slice::<UsageRecord>(&bytes)
                .map(|record| record.token_count)
                .unwrap_or(0)),
            Err(error) if error.is_not_found() => Ok(0),
            Err(error) => Err(error),
        }
    }

    /// Add `words` to the session's counter, returning the new total.
    ///
    /// Read-modify-write; callers hold the session lock so writes for one
    /// session never interleave within a process.
    pub async fn add(&self, session_id: &str, words: usize) -> Result<usize, StorageError> {
        let total = self.current(session_id).await? + words;
        let record = UsageRecord {
            token_count: total,
            ts: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let body = serde_json::to_vec(&record).expect("usage record serializes to JSON");
        self.store
            .put(&self.bucket, &Self::usage_key(session_id), body)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn tracker() -> QuotaTracker {
        QuotaTracker::new(Arc::new(MemoryBlobStore::new()), "indexes".to_string())
    }

    #[tokio::test]
    async fn fresh_session_starts_at_zero() {
        let tracker = tracker();
        assert_eq!(tracker.current("sess-1").await.expect("current"), 0);
    }

    #[tokio::test]
    async fn counter_accumulates_across_rounds() {
        let tracker = tracker();
        assert_eq!(tracker.add("sess-1", 45).await.expect("add"), 45);
        assert_eq!(tracker.add("sess-1", 65).await.expect("add"), 110);
        assert_eq!(tracker.current("sess-1").await.expect("current"), 110);
    }

    #[tokio::test]
    async fn sessions_are_counted_independently() {
        let tracker = tracker();
        tracker.add("sess-1", 40).await.expect("add");
        assert_eq!(tracker.current("sess-2").await.expect("current"), 0);
    }
}
