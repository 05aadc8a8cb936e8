//! Durable per-session status records.
//!
//! One record per session, fully replaced on every write. The state machine
//! is `absent -> uploaded -> (ready | error)`; `ready` and `error` are
//! terminal until the next upload restarts the cycle. There is no
//! intermediate `processing` state: a poll during a long build sees
//! `uploaded` until the terminal state lands.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::{BlobStore, StorageError};

/// Upload/build progress states recorded for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// A document upload has started; the index is not yet built.
    Uploaded,
    /// The session's index is built and queryable.
    Ready,
    /// The last upload failed; see the record's message.
    Error,
}

/// Persisted status record for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current state of the session's upload/build cycle.
    pub status: SessionStatus,
    /// Epoch seconds at which the record was written.
    pub ts: i64,
    /// Original filename of the upload, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Blob store key of the stored document, once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_key: Option<String>,
    /// Failure message, for `error` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Optional fields attached to a status write.
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    /// Original filename of the upload.
    pub filename: Option<String>,
    /// Blob store key of the stored document.
    pub pdf_key: Option<String>,
    /// Failure message.
    pub message: Option<String>,
}

impl StatusFields {
    /// Fields carrying only a filename.
    pub fn filename(name: &str) -> Self {
        Self {
            filename: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Fields carrying only a document key.
    pub fn pdf_key(key: &str) -> Self {
        Self {
            pdf_key: Some(key.to_string()),
            ..Self::default()
        }
    }

    /// Fields carrying only a failure message.
    pub fn message(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// Reads and overwrites per-session status records in the blob store.
pub struct StatusLedger {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl StatusLedger {
    /// Create a ledger writing into the given bucket.
    pub fn new(store: Arc<dyn BlobStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    fn status_key(session_id: &str) -> String {
        format!("{session_id}/status.json")
    }

    /// Overwrite the session's status record.
    pub async fn write(
        &self,
        session_id: &str,
        status: SessionStatus,
        fields: StatusFields,
    ) -> Result<(), StorageError> {
        let record = StatusRecord {
            status,
            ts: OffsetDateTime::now_utc().unix_timestamp(),
            filename: fields.filename,
            pdf_key: fields.pdf_key,
            message: fields.message,
        };
        let body = serde_json::to_vec(&record).expect("status record serializes to JSON");
        self.store
            .put(&self.bucket, &Self::status_key(session_id), body)
            .await
    }

    /// Overwrite the status record, downgrading failures to a warning.
    ///
    /// Ledger writes are best-effort telemetry; they never fail the caller's
    /// primary operation.
    pub async fn record(&self, session_id: &str, status: SessionStatus, fields: StatusFields) {
        if let Err(error) = self.write(session_id, status, fields).await {
            tracing::warn!(
                session = session_id,
                status = ?status,
                error = %error,
                "Failed to write status record"
            );
        }
    }

    /// Read the session's status record; absence means nothing uploaded yet.
    pub async fn read(&self, session_id: &str) -> Result<Option<StatusRecord>, StorageError> {
        match self
            .store
            .get(&self.bucket, &Self::status_key(session_id))
            .await
        {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(error) => {
                    tracing::warn!(
                        session = session_id,
                        error = %error,
                        "Discarding undecodable status record"
                    );
                    Ok(None)
                }
            },
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}
