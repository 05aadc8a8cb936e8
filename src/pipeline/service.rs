//! QA service coordinating extraction, indexing, retrieval, and quota.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    completion::{CompletionClient, HttpCompletionClient},
    config::get_config,
    embedding::{self, EmbeddingClient},
    extract::ExtractorChain,
    index::{IndexStore, SegmentSearch, build_index},
    metrics::{MetricsSnapshot, QaMetrics},
    pipeline::{
        chunking::segment_document,
        sanitize::{sanitize_filename, word_count},
        types::{AnswerError, IngestError, IngestOutcome},
    },
    session::{
        QuotaTracker, SessionLocks, SessionReaper, SessionStatus, StatusFields, StatusLedger,
        StatusRecord,
    },
    storage::{BlobStore, S3BlobStore},
};

/// Fixed instruction template applied to every answer.
pub const SYSTEM_PROMPT: &str = "You answer ONLY from the provided context. \
If the exact answer is not stated explicitly, use related evidence from the context \
to infer the best possible answer. Only declare that there is insufficient evidence \
when nothing relevant appears in the context. \
Be direct and cite terms from the document when useful.";

/// Coordinates the full session lifecycle: upload, index build, readiness,
/// quota-gated answering, and teardown.
///
/// The service owns long-lived handles to the blob store, extractor chain,
/// and model clients. Construct it once near process start and share it
/// through an `Arc`.
pub struct QaService {
    store: Arc<dyn BlobStore>,
    extractor: ExtractorChain,
    embedder: Arc<dyn EmbeddingClient>,
    completer: Arc<dyn CompletionClient>,
    ledger: StatusLedger,
    quota: QuotaTracker,
    reaper: SessionReaper,
    index_store: IndexStore,
    locks: SessionLocks,
    metrics: Arc<QaMetrics>,
    doc_bucket: String,
    chunk_size: usize,
    chunk_overlap: usize,
    max_session_tokens: usize,
    top_k: usize,
}

/// Abstraction over the QA pipeline used by the transport layer.
#[async_trait]
pub trait QaApi: Send + Sync {
    /// Store an uploaded document, build its index, and mark the session ready.
    async fn ingest_document(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError>;

    /// Answer a question against the session's index.
    async fn answer_question(&self, session_id: &str, question: &str)
    -> Result<String, AnswerError>;

    /// Read the session's status record, when one exists.
    async fn session_status(&self, session_id: &str) -> Option<StatusRecord>;

    /// Tear down the session, returning the number of objects removed.
    async fn reset_session(&self, session_id: &str) -> usize;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl QaService {
    /// Build a service wired to the production backends named in configuration.
    pub fn from_env() -> Self {
        let store: Arc<dyn BlobStore> =
            Arc::new(S3BlobStore::new().expect("Failed to initialize blob store"));
        let embedder = embedding::client_from_config();
        let completer: Arc<dyn CompletionClient> = Arc::new(
            HttpCompletionClient::from_config().expect("Failed to initialize completion client"),
        );
        Self::with_components(store, ExtractorChain::default_chain(), embedder, completer)
    }

    /// Build a service over explicit collaborators; buckets and tuning come
    /// from the process configuration.
    pub fn with_components(
        store: Arc<dyn BlobStore>,
        extractor: ExtractorChain,
        embedder: Arc<dyn EmbeddingClient>,
        completer: Arc<dyn CompletionClient>,
    ) -> Self {
        let config = get_config();
        Self {
            ledger: StatusLedger::new(store.clone(), config.index_bucket.clone()),
            quota: QuotaTracker::new(store.clone(), config.index_bucket.clone()),
            reaper: SessionReaper::new(
                store.clone(),
                config.doc_bucket.clone(),
                config.index_bucket.clone(),
            ),
            index_store: IndexStore::new(store.clone(), config.index_bucket.clone()),
            locks: SessionLocks::new(),
            metrics: Arc::new(QaMetrics::new()),
            doc_bucket: config.doc_bucket.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_session_tokens: config.max_session_tokens,
            top_k: config.search_top_k,
            store,
            extractor,
            embedder,
            completer,
        }
    }

    /// Store the upload, extract and segment its text, build and persist the
    /// index, and advance the status ledger to a terminal state.
    pub async fn ingest_document(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError> {
        let _guard = self.locks.acquire(session_id).await;

        self.ledger
            .record(
                session_id,
                SessionStatus::Uploaded,
                StatusFields::filename(filename),
            )
            .await;

        match self.ingest_inner(session_id, filename, bytes).await {
            Ok(outcome) => {
                self.ledger
                    .record(
                        session_id,
                        SessionStatus::Ready,
                        StatusFields::pdf_key(&outcome.pdf_key),
                    )
                    .await;
                self.metrics.record_document(outcome.chunks as u64);
                tracing::info!(
                    session = session_id,
                    pdf_key = %outcome.pdf_key,
                    chunks = outcome.chunks,
                    "Document indexed"
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(
                    session = session_id,
                    error = %error,
                    "Upload processing failed"
                );
                self.ledger
                    .record(
                        session_id,
                        SessionStatus::Error,
                        StatusFields::message(&error.to_string()),
                    )
                    .await;
                Err(error)
            }
        }
    }

    async fn ingest_inner(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError> {
        let safe_name = sanitize_filename(filename);
        let pdf_key = format!("{session_id}/{}-{safe_name}", Uuid::new_v4());

        self.store
            .put(&self.doc_bucket, &pdf_key, bytes.clone())
            .await?;
        tracing::info!(
            session = session_id,
            pdf_key = %pdf_key,
            size = bytes.len(),
            "Document stored"
        );

        let pages = self.extractor.extract(&bytes)?;
        let segments = segment_document(&pages, self.chunk_size, self.chunk_overlap)?;
        let chunks = segments.len();

        let index = build_index(segments, self.embedder.as_ref()).await?;
        self.index_store.save(&index, session_id).await?;

        Ok(IngestOutcome { pdf_key, chunks })
    }

    /// Answer a question against the session's index, enforcing the
    /// readiness and quota gates in order.
    pub async fn answer_question(
        &self,
        session_id: &str,
        question: &str,
    ) -> Result<String, AnswerError> {
        let _guard = self.locks.acquire(session_id).await;

        let record = self.ledger.read(session_id).await?;
        if record.map(|r| r.status) != Some(SessionStatus::Ready) {
            return Err(AnswerError::IndexNotReady);
        }

        let used = self.quota.current(session_id).await?;
        if used >= self.max_session_tokens {
            let removed = self.reaper.purge(session_id).await;
            self.metrics.record_purge();
            tracing::info!(
                session = session_id,
                used,
                limit = self.max_session_tokens,
                removed,
                "Session word limit reached; session purged"
            );
            return Err(AnswerError::QuotaExceeded);
        }

        let index = self
            .index_store
            .load(session_id)
            .await
            .map_err(AnswerError::IndexUnavailable)?;

        tracing::info!(
            session = session_id,
            question_len = question.chars().count(),
            "Answering question"
        );
        let query_vector = self.embedder.embed(question).await?;
        let hits = index.search(&query_vector, self.top_k);
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self
            .completer
            .complete(SYSTEM_PROMPT, &context, question)
            .await?;

        let spent = word_count(question) + word_count(&answer);
        match self.quota.add(session_id, spent).await {
            Ok(total) => tracing::debug!(session = session_id, spent, total, "Recorded usage"),
            Err(error) => tracing::warn!(
                session = session_id,
                error = %error,
                "Failed to record session usage"
            ),
        }

        self.metrics.record_question();
        tracing::info!(
            session = session_id,
            answer_len = answer.chars().count(),
            "Question answered"
        );
        Ok(answer)
    }

    /// Read the session's status record; storage failures read as absent.
    pub async fn session_status(&self, session_id: &str) -> Option<StatusRecord> {
        match self.ledger.read(session_id).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    session = session_id,
                    error = %error,
                    "Failed to read status record"
                );
                None
            }
        }
    }

    /// Tear down a session explicitly, deleting everything under its prefix.
    pub async fn reset_session(&self, session_id: &str) -> usize {
        let _guard = self.locks.acquire(session_id).await;
        let removed = self.reaper.purge(session_id).await;
        self.metrics.record_purge();
        removed
    }

    /// Return the current ingestion and answer metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl QaApi for QaService {
    async fn ingest_document(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, IngestError> {
        QaService::ingest_document(self, session_id, filename, bytes).await
    }

    async fn answer_question(
        &self,
        session_id: &str,
        question: &str,
    ) -> Result<String, AnswerError> {
        QaService::answer_question(self, session_id, question).await
    }

    async fn session_status(&self, session_id: &str) -> Option<StatusRecord> {
        QaService::session_status(self, session_id).await
    }

    async fn reset_session(&self, session_id: &str) -> usize {
        QaService::reset_session(self, session_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        QaService::metrics_snapshot(self)
    }
}
