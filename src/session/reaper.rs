//! Session teardown: delete everything under a session's key prefix.

use std::sync::Arc;

use crate::storage::BlobStore;

/// Deletes all of a session's objects from the document and index buckets.
pub struct SessionReaper {
    store: Arc<dyn BlobStore>,
    doc_bucket: String,
    index_bucket: String,
}

impl SessionReaper {
    /// Create a reaper covering both buckets a session writes into.
    pub fn new(store: Arc<dyn BlobStore>, doc_bucket: String, index_bucket: String) -> Self {
        Self {
            store,
            doc_bucket,
            index_bucket,
        }
    }

    /// Delete every object under the session prefix in both buckets.
    ///
    /// Best-effort per object: a failed delete is logged and skipped so one
    /// poison object cannot block cleanup of the rest. Purging an empty
    /// prefix is a no-op success. Returns the number of objects removed.
    pub async fn purge(&self, session_id: &str) -> usize {
        let prefix = format!("{session_id}/");
        let mut removed = 0;

        for bucket in [&self.doc_bucket, &self.index_bucket] {
            let keys = match self.store.list(bucket, &prefix).await {
                Ok(keys) => keys,
                Err(error) => {
                    tracing::warn!(
                        session = session_id,
                        bucket = %bucket,
                        error = %error,
                        "Failed to list session objects for purge"
                    );
                    continue;
                }
            };

            for key in keys {
                match self.store.delete(bucket, &key).await {
                    Ok(()) => removed += 1,
                    Err(error) => {
                        tracing::warn!(
                            session = session_id,
                            bucket = %bucket,
                            key = %key,
                            error = %error,
                            "Failed to delete session object; skipping"
                        );
                    }
                }
            }
        }

        tracing::info!(session = session_id, removed, "Session purge complete");
        removed
    }
}
