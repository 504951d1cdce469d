use async_trait::async_trait;
use rowsync_core::{Embeddings, RowsyncError};

/// Deterministic embeddings for testing.
/// Equal texts always map to the same unit vector.
#[derive(Debug, Clone)]
pub struct FakeEmbeddings {
    dimensions: usize,
}

impl FakeEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl Default for FakeEmbeddings {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl Embeddings for FakeEmbeddings {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RowsyncError> {
        Ok(texts
            .iter()
            .map(|t| text_to_vector(t, self.dimensions))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RowsyncError> {
        Ok(text_to_vector(text, self.dimensions))
    }
}

fn text_to_vector(text: &str, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }
    let mut vec = vec![0.0f32; dimensions];
    for (i, byte) in text.bytes().enumerate() {
        vec[i % dimensions] += byte as f32;
    }
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vec {
            *x /= magnitude;
        }
    }
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_same_vector() {
        let embeddings = FakeEmbeddings::default();
        let a = embeddings.embed_query("Chaise costs 49.99").await.unwrap();
        let b = embeddings.embed_query("Chaise costs 49.99").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let embeddings = FakeEmbeddings::new(8);
        let v = embeddings.embed_query("Lampe").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_is_the_zero_vector() {
        let v = FakeEmbeddings::default().embed_query("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn batch_matches_single() {
        let embeddings = FakeEmbeddings::default();
        let batch = embeddings.embed_documents(&["a", "b"]).await.unwrap();
        assert_eq!(batch[1], embeddings.embed_query("b").await.unwrap());
    }
}
