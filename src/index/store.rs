//! Durable storage for vector indexes.
//!
//! An index serializes to two companion artifacts under the session prefix:
//! a numeric vectors file and a segments lookup file. The pair must be
//! written and read together; a partial pair is unusable. Serialization goes
//! through a local scratch directory first so a failure mid-serialization
//! can never leave a half-written durable artifact.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::storage::{BlobStore, StorageError};

use super::VectorIndex;

const VECTORS_FILE: &str = "index.vectors.json";
const SEGMENTS_FILE: &str = "index.segments.json";

/// Errors raised while persisting or loading index artifacts.
#[derive(Debug, Error)]
pub enum IndexStoreError {
    /// One or both artifacts are missing for the session.
    #[error("Index artifacts not found for session")]
    NotFound,
    /// Artifacts were present but could not be decoded consistently.
    #[error("Index artifacts corrupt: {0}")]
    Corrupt(String),
    /// Blob store request failed outright.
    #[error("Blob store request failed: {0}")]
    Storage(StorageError),
    /// Local scratch directory could not be used.
    #[error("Scratch directory error: {0}")]
    Scratch(#[from] std::io::Error),
}

impl From<StorageError> for IndexStoreError {
    fn from(error: StorageError) -> Self {
        if error.is_not_found() {
            Self::NotFound
        } else {
            Self::Storage(error)
        }
    }
}

/// Numeric artifact: vector dimension plus one row per segment.
#[derive(Serialize, Deserialize)]
struct VectorsArtifact {
    dimension: usize,
    rows: Vec<Vec<f32>>,
}

/// Lookup artifact: ordered segment texts plus build metadata.
#[derive(Serialize, Deserialize)]
struct SegmentsArtifact {
    model: String,
    created_at: String,
    segments: Vec<String>,
}

/// Reads and writes index artifact pairs keyed by session.
pub struct IndexStore {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl IndexStore {
    /// Create a store writing into the given bucket.
    pub fn new(store: Arc<dyn BlobStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    fn vectors_key(session_id: &str) -> String {
        format!("{session_id}/{VECTORS_FILE}")
    }

    fn segments_key(session_id: &str) -> String {
        format!("{session_id}/{SEGMENTS_FILE}")
    }

    /// Serialize the index to scratch files, then upload both artifacts.
    pub async fn save(&self, index: &VectorIndex, session_id: &str) -> Result<(), IndexStoreError> {
        let vectors = VectorsArtifact {
            dimension: index.dimension(),
            rows: index.vectors().to_vec(),
        };
        let segments = SegmentsArtifact {
            model: index.model().to_string(),
            created_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            segments: index.segments().to_vec(),
        };

        let scratch = tempfile::tempdir()?;
        let vectors_path = scratch.path().join(VECTORS_FILE);
        let segments_path = scratch.path().join(SEGMENTS_FILE);
        std::fs::write(
            &vectors_path,
            serde_json::to_vec(&vectors).map_err(|error| {
                IndexStoreError::Corrupt(format!("failed to encode vectors artifact: {error}"))
            })?,
        )?;
        std::fs::write(
            &segments_path,
            serde_json::to_vec(&segments).map_err(|error| {
                IndexStoreError::Corrupt(format!("failed to encode segments artifact: {error}"))
            })?,
        )?;

        self.store
            .put(
                &self.bucket,
                &Self::vectors_key(session_id),
                std::fs::read(&vectors_path)?,
            )
            .await?;
        self.store
            .put(
                &self.bucket,
                &Self::segments_key(session_id),
                std::fs::read(&segments_path)?,
            )
            .await?;

        tracing::info!(
            session = session_id,
            segments = index.len(),
            dimension = index.dimension(),
            "Index artifacts stored"
        );
        Ok(())
    }

    /// Download both artifacts and rebuild the index.
    ///
    /// The embedding function that matches the stored vectors is supplied by
    /// the caller at query time; the store only records the model name for
    /// diagnostics.
    pub async fn load(&self, session_id: &str) -> Result<VectorIndex, IndexStoreError> {
        let vectors_bytes = self
            .store
            .get(&self.bucket, &Self::vectors_key(session_id))
            .await?;
        let segments_bytes = self
            .store
            .get(&self.bucket, &Self::segments_key(session_id))
            .await?;

        let vectors: VectorsArtifact = serde_json::from_slice(&vectors_bytes)
            .map_err(|error| IndexStoreError::Corrupt(format!("vectors artifact: {error}")))?;
        let segments: SegmentsArtifact = serde_json::from_slice(&segments_bytes)
            .map_err(|error| IndexStoreError::Corrupt(format!("segments artifact: {error}")))?;

        if vectors.rows.len() != segments.segments.len() {
            return Err(IndexStoreError::Corrupt(format!(
                "artifact pair inconsistent: {} vectors for {} segments",
                vectors.rows.len(),
                segments.segments.len()
            )));
        }
        if let Some(row) = vectors
            .rows
            .iter()
            .find(|row| row.len() != vectors.dimension)
        {
            return Err(IndexStoreError::Corrupt(format!(
                "vector row length {} does not match dimension {}",
                row.len(),
                vectors.dimension
            )));
        }

        Ok(VectorIndex::from_rows(
            vectors.dimension,
            segments.model,
            segments.segments,
            vectors.rows,
        ))
    }
}
