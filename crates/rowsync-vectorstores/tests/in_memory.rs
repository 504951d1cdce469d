use rowsync_core::{
    Embeddings, PayloadFilter, Point, PointId, RenderedDocument, RowsyncError, VectorIndex,
};
use rowsync_embeddings::FakeEmbeddings;
use rowsync_vectorstores::InMemoryIndex;
use uuid::Uuid;

async fn point(text: &str, owner: &str, source: &str, data_id: &str) -> Point {
    let vector = FakeEmbeddings::default().embed_query(text).await.unwrap();
    Point {
        id: PointId::from(Uuid::new_v4()),
        vector,
        payload: RenderedDocument::new(text, source, owner, data_id),
    }
}

#[tokio::test]
async fn upsert_replaces_same_identity() {
    let index = InMemoryIndex::new();
    let mut first = point("Chaise costs 49.99", "u1", "shop/products", "1").await;
    let id = first.id;
    index.upsert(vec![first.clone()]).await.unwrap();

    first.payload.text = "Chaise costs 39.99".to_string();
    index.upsert(vec![first]).await.unwrap();

    assert_eq!(index.len().await, 1);
    assert_eq!(index.get(&id).await.unwrap().payload.text, "Chaise costs 39.99");
}

#[tokio::test]
async fn search_ranks_closest_first() {
    let index = InMemoryIndex::new();
    index
        .upsert(vec![
            point("The cat sat on the mat", "u1", "s", "1").await,
            point("A fish swam in the ocean", "u1", "s", "2").await,
        ])
        .await
        .unwrap();

    let query = FakeEmbeddings::default()
        .embed_query("The cat sat on the mat")
        .await
        .unwrap();
    let hits = index.search(&query, 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.data_id, "1");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn search_respects_filter() {
    let index = InMemoryIndex::new();
    index
        .upsert(vec![
            point("alpha", "u1", "s", "1").await,
            point("alpha", "u2", "s", "1").await,
        ])
        .await
        .unwrap();

    let query = FakeEmbeddings::default().embed_query("alpha").await.unwrap();
    let filter = PayloadFilter::new().with_owner("u2");
    let hits = index.search(&query, 10, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.owner_id, "u2");
}

#[tokio::test]
async fn delete_by_filter_only_touches_matches() {
    let index = InMemoryIndex::new();
    index
        .upsert(vec![
            point("a", "u1", "shop/products", "1").await,
            point("b", "u1", "shop/products", "2").await,
            point("c", "u2", "shop/products", "1").await,
            point("d", "u1", "shop/orders", "1").await,
        ])
        .await
        .unwrap();

    let filter = PayloadFilter::new()
        .with_owner("u1")
        .with_source("shop/products");
    index.delete_by_filter(&filter).await.unwrap();

    let mut left: Vec<_> = index
        .points()
        .await
        .into_iter()
        .map(|p| p.payload.text)
        .collect();
    left.sort();
    assert_eq!(left, vec!["c", "d"]);
}

#[tokio::test]
async fn empty_filter_delete_is_refused() {
    let index = InMemoryIndex::new();
    index.upsert(vec![point("a", "u1", "s", "1").await]).await.unwrap();
    let err = index.delete_by_filter(&PayloadFilter::new()).await.unwrap_err();
    assert!(matches!(err, RowsyncError::Validation(_)));
    assert_eq!(index.len().await, 1);
}

#[tokio::test]
async fn delete_ignores_unknown_ids() {
    let index = InMemoryIndex::new();
    let p = point("a", "u1", "s", "1").await;
    let id = p.id;
    index.upsert(vec![p]).await.unwrap();
    index
        .delete(&[PointId::from(Uuid::new_v4()), id])
        .await
        .unwrap();
    assert!(index.is_empty().await);
}

#[tokio::test]
async fn vector_size_is_enforced() {
    let index = InMemoryIndex::new().with_vector_size(8);
    let err = index
        .upsert(vec![point("a", "u1", "s", "1").await])
        .await
        .unwrap_err();
    assert!(matches!(err, RowsyncError::Index(_)));
}
