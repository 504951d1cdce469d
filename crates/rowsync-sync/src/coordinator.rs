use std::sync::Arc;

use rowsync_core::{
    Embeddings, PayloadFilter, Point, PointId, RenderedDocument, RowsyncError, ScoredPoint,
    VectorIndex,
};
use tracing::debug;

use crate::identity::deterministic_id;

/// Result count used by [`SyncCoordinator::search`] when `k` is 0.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Embeds documents and keeps the vector index keyed by document identity.
#[derive(Clone)]
pub struct SyncCoordinator {
    embeddings: Arc<dyn Embeddings>,
    index: Arc<dyn VectorIndex>,
}

impl SyncCoordinator {
    pub fn new(embeddings: Arc<dyn Embeddings>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embeddings, index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed `doc.text` and upsert it under its deterministic identity.
    ///
    /// Nothing is written when embedding fails.
    pub async fn upsert_document(&self, doc: &RenderedDocument) -> Result<PointId, RowsyncError> {
        let id = deterministic_id(&doc.source, &doc.owner_id, &doc.data_id);
        let vector = self.embeddings.embed_query(&doc.text).await?;
        if vector.is_empty() {
            return Err(RowsyncError::Embedding(format!(
                "empty embedding for data id {}",
                doc.data_id
            )));
        }

        self.index
            .upsert(vec![Point {
                id,
                vector,
                payload: doc.clone(),
            }])
            .await?;
        debug!(point_id = %id, data_id = %doc.data_id, "upserted document");
        Ok(id)
    }

    /// Delete the point for one row. Deleting an unknown identity is a no-op.
    pub async fn delete_by_id(
        &self,
        source: &str,
        owner_id: &str,
        data_id: &str,
    ) -> Result<PointId, RowsyncError> {
        let id = deterministic_id(source, owner_id, data_id);
        self.index.delete(&[id]).await?;
        debug!(point_id = %id, "deleted document");
        Ok(id)
    }

    /// Delete every point of `owner_id` from `source`. Both must be non-empty.
    pub async fn delete_by_filter(&self, owner_id: &str, source: &str) -> Result<(), RowsyncError> {
        if owner_id.is_empty() || source.is_empty() {
            return Err(RowsyncError::Validation(
                "delete by filter needs both owner_id and source".to_string(),
            ));
        }
        let filter = PayloadFilter::new().with_owner(owner_id).with_source(source);
        self.index.delete_by_filter(&filter).await?;
        debug!(owner_id, source, "deleted documents by filter");
        Ok(())
    }

    /// Embed `query` and return the `k` closest points (`k = 0` means
    /// [`DEFAULT_SEARCH_LIMIT`]).
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>, RowsyncError> {
        let k = if k == 0 { DEFAULT_SEARCH_LIMIT } else { k };
        let vector = self.embeddings.embed_query(query).await?;
        self.index.search(&vector, k, filter).await
    }
}
