use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    PointId as QdrantPointId, PointStruct, PointsIdsList, ScoredPoint as QdrantScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use rowsync_core::{
    PayloadFilter, Point, PointId, RenderedDocument, RowsyncError, ScoredPoint, VectorIndex,
};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// QdrantConfig
// ---------------------------------------------------------------------------

/// Configuration for connecting to a Qdrant instance.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant gRPC URL (e.g. `http://localhost:6334`).
    pub url: String,
    /// Name of the collection to operate on.
    pub collection_name: String,
    /// Dimensionality of the embedding vectors.
    pub vector_size: u64,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Distance metric for similarity search. Defaults to `Cosine`.
    pub distance: Distance,
    /// Payload fields that get a keyword index when the collection is created.
    pub indexed_fields: Vec<String>,
}

impl QdrantConfig {
    pub fn new(
        url: impl Into<String>,
        collection_name: impl Into<String>,
        vector_size: u64,
    ) -> Self {
        Self {
            url: url.into(),
            collection_name: collection_name.into(),
            vector_size,
            api_key: None,
            distance: Distance::Cosine,
            indexed_fields: ["owner_id", "source", "data_id"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_indexed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexed_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// QdrantIndex
// ---------------------------------------------------------------------------

/// A [`VectorIndex`] backed by a Qdrant collection.
pub struct QdrantIndex {
    client: Qdrant,
    config: QdrantConfig,
}

impl QdrantIndex {
    /// Build a client for the configured URL. No request is made yet.
    pub fn new(config: QdrantConfig) -> Result<Self, RowsyncError> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RowsyncError::Config(format!("failed to build Qdrant client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_client(client: Qdrant, config: QdrantConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Qdrant {
        &self.client
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    async fn create_collection(&self) -> Result<(), RowsyncError> {
        let name = &self.config.collection_name;
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(
                VectorParamsBuilder::new(self.config.vector_size, self.config.distance),
            ))
            .await
            .map_err(|e| RowsyncError::Index(format!("failed to create collection {name}: {e}")))?;

        for field in &self.config.indexed_fields {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(name, field, FieldType::Keyword)
                        .wait(true),
                )
                .await
                .map_err(|e| {
                    RowsyncError::Index(format!("failed to index payload field {field}: {e}"))
                })?;
        }
        info!(collection = %name, size = self.config.vector_size, "created collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<(), RowsyncError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection_name)
            .await
            .map_err(|e| RowsyncError::Index(format!("collection_exists check failed: {e}")))?;
        if !exists {
            self.create_collection().await?;
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<Point>) -> Result<(), RowsyncError> {
        if points.is_empty() {
            return Ok(());
        }
        let structs = points
            .into_iter()
            .map(|point| {
                let payload = document_to_payload(&point.payload);
                PointStruct::new(point.id.to_string(), point.vector, payload)
            })
            .collect::<Vec<_>>();
        let count = structs.len();

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.config.collection_name, structs).wait(true),
            )
            .await
            .map_err(|e| RowsyncError::Index(format!("upsert failed: {e}")))?;
        debug!(count, "upserted points");
        Ok(())
    }

    async fn delete(&self, ids: &[PointId]) -> Result<(), RowsyncError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<QdrantPointId> = ids.iter().map(|id| QdrantPointId::from(id.to_string())).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection_name)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| RowsyncError::Index(format!("delete failed: {e}")))?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), RowsyncError> {
        if filter.is_empty() {
            return Err(RowsyncError::Validation(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection_name)
                    .points(payload_filter_to_qdrant(filter))
                    .wait(true),
            )
            .await
            .map_err(|e| RowsyncError::Index(format!("delete by filter failed: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>, RowsyncError> {
        let mut request =
            SearchPointsBuilder::new(&self.config.collection_name, vector.to_vec(), k as u64)
                .with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            request = request.filter(payload_filter_to_qdrant(filter));
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| RowsyncError::Index(format!("search failed: {e}")))?;

        response.result.into_iter().map(scored_point_from_qdrant).collect()
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Exact keyword matches on every field the filter sets.
fn payload_filter_to_qdrant(filter: &PayloadFilter) -> Filter {
    Filter::must(
        filter
            .conditions()
            .into_iter()
            .map(|(field, value)| Condition::matches(field, value.to_string())),
    )
}

/// Payload fields stored with every point.
const PAYLOAD_FIELDS: [&str; 4] = ["text", "source", "owner_id", "data_id"];

fn document_to_payload(doc: &RenderedDocument) -> HashMap<String, QdrantValue> {
    let values = [&doc.text, &doc.source, &doc.owner_id, &doc.data_id];
    PAYLOAD_FIELDS
        .into_iter()
        .zip(values)
        .map(|(field, value)| (field.to_string(), QdrantValue::from(value.clone())))
        .collect()
}

fn payload_string(payload: &HashMap<String, QdrantValue>, field: &str) -> Result<String, RowsyncError> {
    match payload.get(field).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Ok(s.clone()),
        Some(_) => Err(RowsyncError::Index(format!("payload field {field} is not a string"))),
        None => Err(RowsyncError::Index(format!("payload field {field} is missing"))),
    }
}

fn payload_to_document(payload: &HashMap<String, QdrantValue>) -> Result<RenderedDocument, RowsyncError> {
    Ok(RenderedDocument::new(
        payload_string(payload, "text")?,
        payload_string(payload, "source")?,
        payload_string(payload, "owner_id")?,
        payload_string(payload, "data_id")?,
    ))
}

fn scored_point_from_qdrant(sp: QdrantScoredPoint) -> Result<ScoredPoint, RowsyncError> {
    let id = match sp.id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.parse::<PointId>()?,
        Some(PointIdOptions::Num(num)) => {
            return Err(RowsyncError::Index(format!("unexpected numeric point id {num}")))
        }
        None => return Err(RowsyncError::Index("search hit without point id".to_string())),
    };
    Ok(ScoredPoint {
        id,
        score: sp.score,
        payload: payload_to_document(&sp.payload)?,
    })
}
