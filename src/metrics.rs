use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and answer activity.
#[derive(Default)]
pub struct QaMetrics {
    documents_indexed: AtomicU64,
    segments_indexed: AtomicU64,
    questions_answered: AtomicU64,
    sessions_purged: AtomicU64,
}

impl QaMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of segments produced for it.
    pub fn record_document(&self, segment_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.segments_indexed
            .fetch_add(segment_count, Ordering::Relaxed);
    }

    /// Record a successfully answered question.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purged session.
    pub fn record_purge(&self) {
        self.sessions_purged.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            segments_indexed: self.segments_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            sessions_purged: self.sessions_purged.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the activity counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents indexed since startup.
    pub documents_indexed: u64,
    /// Total segment count produced across all indexed documents.
    pub segments_indexed: u64,
    /// Number of questions answered since startup.
    pub questions_answered: u64,
    /// Number of sessions purged since startup.
    pub sessions_purged: u64,
}
