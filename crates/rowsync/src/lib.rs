//! Rowsync: keep a vector index in sync with relational rows rendered
//! through templates.
//!
//! This crate re-exports the Rowsync sub-crates for single-import usage.
//! Enable features to control which modules are available.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `sync`, `embeddings`, `vectorstores`, `callbacks` |
//! | `sql` | Schema introspection, join planning, paged scans (SQLite, Postgres) |
//! | `template` | `{{.table.column}}` document templates |
//! | `embeddings` | Fake and HTTP embedding clients |
//! | `vectorstores` | In-memory vector index |
//! | `qdrant` | Qdrant vector index |
//! | `callbacks` | Recording, tracing and composite run callbacks |
//! | `sync` | `sql` + `template` + synchronizer and coordinator |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rowsync::core::{PayloadFilter, RowsyncError};
//! use rowsync::sql::SqliteSource;
//! use rowsync::sync::{SyncConfig, SyncCoordinator, SyncRequest, Synchronizer};
//! ```

/// Core traits and types: RelationalSource, Embeddings, VectorIndex,
/// SyncCallback, RowsyncError. Always available.
pub use rowsync_core as core;

/// SQLite and Postgres sources, join planner, page scanner.
#[cfg(feature = "sql")]
pub use rowsync_sql as sql;

/// Document templates.
#[cfg(feature = "template")]
pub use rowsync_template as template;

/// Embeddings: Fake, Http.
#[cfg(feature = "embeddings")]
pub use rowsync_embeddings as embeddings;

/// Vector indexes: InMemory.
#[cfg(feature = "vectorstores")]
pub use rowsync_vectorstores as vectorstores;

/// Qdrant vector index.
#[cfg(feature = "qdrant")]
pub use rowsync_qdrant as qdrant;

/// Callback handlers: Recording, Tracing, Composite.
#[cfg(feature = "callbacks")]
pub use rowsync_callbacks as callbacks;

/// Synchronizer, coordinator and deterministic identities.
#[cfg(feature = "sync")]
pub use rowsync_sync as sync;
