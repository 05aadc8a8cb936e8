//! Index construction from text segments.

use crate::embedding::{EmbedError, EmbeddingClient};

use super::VectorIndex;

/// Embed each segment in order and assemble a [`VectorIndex`].
///
/// Segments are embedded one call per segment, no deduplication. The first
/// embedding failure abandons the whole build so a partial index is never
/// handed to the caller.
pub async fn build_index(
    segments: Vec<String>,
    embedder: &dyn EmbeddingClient,
) -> Result<VectorIndex, EmbedError> {
    let mut index = VectorIndex::new(embedder.dimension(), embedder.model().to_string());
    for segment in segments {
        let vector = embedder.embed(&segment).await?;
        index.push(segment, vector);
    }
    tracing::debug!(
        segments = index.len(),
        dimension = index.dimension(),
        model = index.model(),
        "Built vector index"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbeddingClient;
    use crate::index::SegmentSearch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailAtClient {
        inner: HashedEmbeddingClient,
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for FailAtClient {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_at {
                return Err(EmbedError::Unavailable("throttled".to_string()));
            }
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model(&self) -> &str {
            self.inner.model()
        }
    }

    #[tokio::test]
    async fn builds_index_over_all_segments() {
        let embedder = HashedEmbeddingClient::new(8);
        let segments = vec!["first".to_string(), "second".to_string()];
        let index = build_index(segments, &embedder).await.expect("build");
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 8);
    }

    #[tokio::test]
    async fn top_hit_for_a_segments_own_embedding_is_itself() {
        let embedder = HashedEmbeddingClient::new(32);
        let segments = vec![
            "payment terms are net thirty".to_string(),
            "the warranty period lasts two years".to_string(),
            "shipping is free above fifty dollars".to_string(),
        ];
        let index = build_index(segments.clone(), &embedder).await.expect("build");

        for segment in &segments {
            let query = embedder.embed(segment).await.expect("embed");
            let hits = index.search(&query, 1);
            assert_eq!(hits[0].text, *segment);
            assert!(hits[0].distance < 1e-6);
        }
    }

    #[tokio::test]
    async fn first_embedding_failure_abandons_the_build() {
        let embedder = FailAtClient {
            inner: HashedEmbeddingClient::new(8),
            fail_at: 3,
            calls: AtomicUsize::new(0),
        };
        let segments: Vec<String> = (1..=5).map(|n| format!("segment {n}")).collect();
        let error = build_index(segments, &embedder).await.unwrap_err();
        assert!(matches!(error, EmbedError::Unavailable(_)));
        // build stops at the failing segment, later ones are never embedded
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }
}
