use instant_distance::{Builder, HnswMap, Search};

use harbor_core::MemoryId;

/// A point in embedding space. Distance is cosine distance (0 = identical),
/// so neighbor lists come back ascending by dissimilarity.
#[derive(Clone, Debug)]
pub struct Embedding(pub Vec<f32>);

impl instant_distance::Point for Embedding {
    fn distance(&self, other: &Self) -> f32 {
        cosine_distance(&self.0, &other.0)
    }
}

/// An HNSW index over the embedded records of one (owner, tier) pair.
///
/// The underlying graph does not support deletion, so the index is rebuilt
/// whenever the store's write version for its (owner, tier) moves.
pub struct VectorIndex {
    map: HnswMap<Embedding, MemoryId>,
    /// Store write version this index was built from.
    pub built_version: u64,
    len: usize,
}

impl VectorIndex {
    /// Build from (id, embedding) pairs. `ef_construction`/`ef_search` are
    /// the accuracy/speed knobs from `[memory.index]`.
    pub fn build(
        entries: Vec<(MemoryId, Vec<f32>)>,
        ef_construction: usize,
        ef_search: usize,
        built_version: u64,
    ) -> Self {
        let len = entries.len();
        let (points, ids): (Vec<Embedding>, Vec<MemoryId>) = entries
            .into_iter()
            .map(|(id, embedding)| (Embedding(embedding), id))
            .unzip();

        let map = Builder::default()
            .ef_construction(ef_construction)
            .ef_search(ef_search)
            .build(points, ids);

        Self {
            map,
            built_version,
            len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Nearest neighbors of `query`, ascending by cosine distance,
    /// at most `k` results.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(MemoryId, f32)> {
        if self.len == 0 || k == 0 {
            return Vec::new();
        }
        let point = Embedding(query.to_vec());
        let mut search = Search::default();
        self.map
            .search(&point, &mut search)
            .map(|item| (*item.value, item.distance))
            .take(k)
            .collect()
    }
}

/// Cosine distance in [0, 2]; 0 = identical direction. Mismatched or
/// zero-norm vectors score as maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_cosine_distance_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_distance(&a, &b), 2.0);
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        let index = VectorIndex::build(
            vec![
                (far, vec![0.0, 1.0, 0.0]),
                (close, vec![0.9, 0.1, 0.0]),
            ],
            100,
            64,
            0,
        );
        let results = index.nearest(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, close);
        assert!(results[0].1 < results[1].1);
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(Vec::new(), 100, 64, 0);
        assert!(index.is_empty());
        assert!(index.nearest(&[1.0, 0.0], 3).is_empty());
    }
}
