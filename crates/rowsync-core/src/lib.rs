use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for Rowsync with one variant per failing collaborator or stage.
#[derive(Debug, Error)]
pub enum RowsyncError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("join error: {0}")]
    Join(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("callback error: {0}")]
    Callback(String),
}

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

/// A foreign-key edge `source_table.source_column -> target_table.target_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRelation {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl ForeignKeyRelation {
    pub fn new(
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            source_column: source_column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        }
    }
}

/// One column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A table and its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Columns referenced by a template, grouped by table.
///
/// Tables keep the order in which they were first seen and each table's
/// columns form an ordered set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableColumnMap {
    entries: Vec<(String, Vec<String>)>,
}

impl TableColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `table.column`; returns `false` if it was already present.
    pub fn insert(&mut self, table: impl Into<String>, column: impl Into<String>) -> bool {
        let table = table.into();
        let column = column.into();
        match self.entries.iter_mut().find(|(t, _)| *t == table) {
            Some((_, columns)) => {
                if columns.contains(&column) {
                    false
                } else {
                    columns.push(column);
                    true
                }
            }
            None => {
                self.entries.push((table, vec![column]));
                true
            }
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn contains(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|columns| columns.iter().any(|c| c == column))
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == table)
    }

    /// The first table ever inserted.
    pub fn first_table(&self) -> Option<&str> {
        self.entries.first().map(|(t, _)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(t, columns)| (t.as_str(), columns.as_slice()))
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// The result of one query: ordered column names and JSON-compatible scalar values.
///
/// Binary driver values are already decoded to text by the time a `RowSet` exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A scanned row regrouped by table: `table -> field -> value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow {
    tables: BTreeMap<String, BTreeMap<String, Value>>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, field: impl Into<String>, value: Value) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(field.into(), value);
    }

    pub fn get(&self, table: &str, field: &str) -> Option<&Value> {
        self.tables.get(table).and_then(|fields| fields.get(field))
    }

    pub fn table(&self, table: &str) -> Option<&BTreeMap<String, Value>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Render a scalar the way it appears in document text and natural keys.
///
/// Strings are emitted verbatim, SQL NULL becomes the empty string.
pub fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Documents and points
// ---------------------------------------------------------------------------

/// A document rendered from one row, and the payload stored alongside its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub text: String,
    /// Originating dataset, e.g. `shop/products`.
    pub source: String,
    pub owner_id: String,
    /// Natural key of the row, stringified.
    pub data_id: String,
}

impl RenderedDocument {
    pub fn new(
        text: impl Into<String>,
        source: impl Into<String>,
        owner_id: impl Into<String>,
        data_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            owner_id: owner_id.into(),
            data_id: data_id.into(),
        }
    }
}

/// Identity of a point in the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(Uuid);

impl PointId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for PointId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for PointId {
    type Err = RowsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RowsyncError::Validation(format!("invalid point id '{s}': {e}")))
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An entry of the vector index: identity, embedding and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: RenderedDocument,
}

/// A search hit, higher score is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    pub payload: RenderedDocument,
}

/// Exact-match conditions on payload fields. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub owner_id: Option<String>,
    pub source: Option<String>,
    pub data_id: Option<String>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_data_id(mut self, data_id: impl Into<String>) -> Self {
        self.data_id = Some(data_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions().is_empty()
    }

    /// `(payload field, expected value)` pairs for every set condition.
    pub fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            ("owner_id", self.owner_id.as_deref()),
            ("source", self.source.as_deref()),
            ("data_id", self.data_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }

    pub fn matches(&self, doc: &RenderedDocument) -> bool {
        self.conditions().into_iter().all(|(field, expected)| {
            let actual = match field {
                "owner_id" => &doc.owner_id,
                "source" => &doc.source,
                _ => &doc.data_id,
            };
            actual == expected
        })
    }
}

// ---------------------------------------------------------------------------
// Relational collaborator
// ---------------------------------------------------------------------------

/// Read-only catalog queries against the working schema.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// All base tables of the working schema with their columns.
    async fn list_tables(&self) -> Result<Vec<TableSchema>, RowsyncError>;

    /// The primary key column of `table`.
    async fn primary_key(&self, table: &str) -> Result<String, RowsyncError>;

    /// A column participating in a unique index of `table`.
    async fn unique_column(&self, table: &str) -> Result<String, RowsyncError>;

    /// Every foreign-key constraint visible in the working schema.
    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyRelation>, RowsyncError>;
}

/// A relational database that can be introspected and queried.
#[async_trait]
pub trait RelationalSource: SchemaIntrospector {
    /// Name of the database, used to build document sources.
    fn database(&self) -> &str;

    /// Execute `sql` and return every row.
    async fn fetch(&self, sql: &str) -> Result<RowSet, RowsyncError>;
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Trait for embedding text into vectors.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed multiple texts (for batch document embedding).
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RowsyncError>;

    /// Embed a single text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RowsyncError>;
}

// ---------------------------------------------------------------------------
// VectorIndex
// ---------------------------------------------------------------------------

/// Trait for vector index backends addressed by deterministic point ids.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Make sure the backing collection and its payload indexes exist.
    async fn ensure_collection(&self) -> Result<(), RowsyncError>;

    /// Insert or replace points by id.
    async fn upsert(&self, points: Vec<Point>) -> Result<(), RowsyncError>;

    /// Delete points by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[PointId]) -> Result<(), RowsyncError>;

    /// Delete every point whose payload matches `filter`.
    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), RowsyncError>;

    /// The `k` points most similar to `vector`, optionally restricted by `filter`.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>, RowsyncError>;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle events emitted during a sync run, used by `SyncCallback` implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    RunStarted {
        run_id: String,
        source: String,
        base_table: String,
    },
    PageFetched {
        run_id: String,
        page: usize,
        rows: usize,
    },
    DocumentUpserted {
        run_id: String,
        point_id: String,
        data_id: String,
    },
    RunFinished {
        run_id: String,
        rows_processed: usize,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

/// Handler for sync lifecycle events.
#[async_trait]
pub trait SyncCallback: Send + Sync {
    async fn on_event(&self, event: SyncEvent) -> Result<(), RowsyncError>;
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cloneable flag that stops an in-flight run at its next await point.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
