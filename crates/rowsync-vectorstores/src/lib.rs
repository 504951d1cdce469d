//! In-memory [`VectorIndex`] for Rowsync.
//!
//! [`InMemoryIndex`] keeps points in a map keyed by [`PointId`], so upserting
//! an existing identity replaces it. Search ranks by cosine similarity.

use std::collections::HashMap;

use async_trait::async_trait;
use rowsync_core::{PayloadFilter, Point, PointId, RowsyncError, ScoredPoint, VectorIndex};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory vector index using cosine similarity.
pub struct InMemoryIndex {
    points: RwLock<HashMap<PointId, Point>>,
    vector_size: Option<usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            vector_size: None,
        }
    }

    /// Reject vectors whose length differs from `size`.
    pub fn with_vector_size(mut self, size: usize) -> Self {
        self.vector_size = Some(size);
        self
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    pub async fn get(&self, id: &PointId) -> Option<Point> {
        self.points.read().await.get(id).cloned()
    }

    /// Snapshot of every stored point, in no particular order.
    pub async fn points(&self) -> Vec<Point> {
        self.points.read().await.values().cloned().collect()
    }

    fn check_size(&self, vector: &[f32]) -> Result<(), RowsyncError> {
        match self.vector_size {
            Some(size) if vector.len() != size => Err(RowsyncError::Index(format!(
                "vector size {} does not match index size {size}",
                vector.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self) -> Result<(), RowsyncError> {
        Ok(())
    }

    async fn upsert(&self, points: Vec<Point>) -> Result<(), RowsyncError> {
        for point in &points {
            self.check_size(&point.vector)?;
        }
        let mut stored = self.points.write().await;
        for point in points {
            debug!(point_id = %point.id, "upserting point");
            stored.insert(point.id, point);
        }
        Ok(())
    }

    async fn delete(&self, ids: &[PointId]) -> Result<(), RowsyncError> {
        let mut stored = self.points.write().await;
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), RowsyncError> {
        if filter.is_empty() {
            return Err(RowsyncError::Validation(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        let mut stored = self.points.write().await;
        let before = stored.len();
        stored.retain(|_, point| !filter.matches(&point.payload));
        debug!(removed = before - stored.len(), "deleted points by filter");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>, RowsyncError> {
        let stored = self.points.read().await;
        let mut scored: Vec<ScoredPoint> = stored
            .values()
            .filter(|point| filter.map_or(true, |f| f.matches(&point.payload)))
            .map(|point| ScoredPoint {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
