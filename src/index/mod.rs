//! Vector index construction, search, and durable storage.

mod builder;
mod store;

pub use builder::build_index;
pub use store::{IndexStore, IndexStoreError};

/// A retrieved segment with its distance from the query vector.
#[derive(Debug, Clone)]
pub struct SegmentHit {
    /// Text of the retrieved segment.
    pub text: String,
    /// Squared L2 distance from the query vector (smaller is closer).
    pub distance: f32,
}

/// Narrow retrieval interface: any index exposing nearest-neighbour search
/// over text segments is substitutable.
pub trait SegmentSearch {
    /// Return up to `k` segments ordered by ascending distance.
    fn search(&self, query_vector: &[f32], k: usize) -> Vec<SegmentHit>;
}

/// In-memory similarity index mapping text segments to embedding vectors.
///
/// Rows are kept in insertion order; `vectors[i]` embeds `segments[i]`.
pub struct VectorIndex {
    dimension: usize,
    model: String,
    segments: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Create an empty index for the given vector dimension and model name.
    pub fn new(dimension: usize, model: String) -> Self {
        Self {
            dimension,
            model,
            segments: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Append a segment and its embedding vector.
    pub(crate) fn push(&mut self, segment: String, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dimension);
        self.segments.push(segment);
        self.vectors.push(vector);
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the index holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Dimension of the stored vectors.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embedding model recorded when the index was built.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn segments(&self) -> &[String] {
        &self.segments
    }

    pub(crate) fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub(crate) fn from_rows(
        dimension: usize,
        model: String,
        segments: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            dimension,
            model,
            segments,
            vectors,
        }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

impl SegmentSearch for VectorIndex {
    fn search(&self, query_vector: &[f32], k: usize) -> Vec<SegmentHit> {
        let mut hits: Vec<SegmentHit> = self
            .segments
            .iter()
            .zip(self.vectors.iter())
            .map(|(segment, vector)| SegmentHit {
                text: segment.clone(),
                distance: squared_l2(query_vector, vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(2, "test-model".into());
        index.push("origin".into(), vec![0.0, 0.0]);
        index.push("near".into(), vec![0.1, 0.0]);
        index.push("far".into(), vec![5.0, 5.0]);
        index
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = sample_index();
        let hits = index.search(&[0.0, 0.0], 3);
        let texts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["origin", "near", "far"]);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[test]
    fn search_truncates_to_k() {
        let index = sample_index();
        let hits = index.search(&[0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn search_on_empty_index_returns_nothing() {
        let index = VectorIndex::new(2, "test-model".into());
        assert!(index.search(&[0.0, 0.0], 5).is_empty());
        assert!(index.is_empty());
    }
}
