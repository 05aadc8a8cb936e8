//! Core data types and error definitions for the QA pipeline.

use thiserror::Error;

use crate::completion::CompletionError;
use crate::embedding::EmbedError;
use crate::extract::ExtractError;
use crate::index::IndexStoreError;
use crate::storage::StorageError;

/// Errors produced while splitting text into segments.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Segmentation configured an impossible character budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would swallow the whole window and the splitter could not advance.
    #[error("chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}")]
    OverlapTooLarge {
        /// Configured character budget per segment.
        chunk_size: usize,
        /// Configured overlap between consecutive segments.
        chunk_overlap: usize,
    },
}

/// Errors emitted by the upload/indexing pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No extraction strategy could read the document.
    #[error("Failed to extract document text: {0}")]
    Extraction(#[from] ExtractError),
    /// Extracted text could not be segmented.
    #[error("Failed to segment document text: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed while building the index.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbedError),
    /// Index artifacts could not be persisted.
    #[error("Failed to persist index artifacts: {0}")]
    IndexStore(#[from] IndexStoreError),
    /// Blob store request failed while storing the document.
    #[error("Blob store request failed: {0}")]
    Storage(#[from] StorageError),
}

/// Errors emitted by the question answering pipeline.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// The session's index is not built yet; a normal state while an upload
    /// is in flight, not an application bug.
    #[error("Index is not ready for this session")]
    IndexNotReady,
    /// The session hit its usage ceiling and has been purged.
    #[error("Session word limit reached; session purged")]
    QuotaExceeded,
    /// Index artifacts could not be loaded for a session marked ready.
    #[error("Index unavailable for this session: {0}")]
    IndexUnavailable(#[source] IndexStoreError),
    /// Embedding provider failed while vectorizing the question.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbedError),
    /// Chat completion provider failed to produce an answer.
    #[error("Failed to generate answer: {0}")]
    Completion(#[from] CompletionError),
    /// Blob store request failed while reading session state.
    #[error("Blob store request failed: {0}")]
    Storage(#[from] StorageError),
}

/// Summary of a completed upload returned to the transport layer.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Blob store key under which the raw document was stored.
    pub pdf_key: String,
    /// Number of text segments indexed for the document.
    pub chunks: usize,
}
