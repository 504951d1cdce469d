//! Sync pipeline for Rowsync.
//!
//! [`SyncCoordinator`] owns the embed-then-upsert round trip and the delete and
//! search paths, all keyed by [`deterministic_id`]. [`Synchronizer`] drives a
//! whole run: parse the template, plan the join, scan pages, render each row
//! and hand the documents to a pool of shard workers.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rowsync_embeddings::FakeEmbeddings;
//! use rowsync_sql::SqliteSource;
//! use rowsync_sync::{SyncConfig, SyncCoordinator, SyncRequest, Synchronizer};
//! use rowsync_vectorstores::InMemoryIndex;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(SqliteSource::in_memory("shop").await?);
//! let coordinator = SyncCoordinator::new(
//!     Arc::new(FakeEmbeddings::default()),
//!     Arc::new(InMemoryIndex::new()),
//! );
//! let sync = Synchronizer::new(source, coordinator, SyncConfig::default())?;
//! let report = sync
//!     .run(&SyncRequest::new("{{.products.nom}} costs {{.products.prix}}", "owner-1"))
//!     .await?;
//! println!("{} rows in {} pages", report.rows_processed, report.pages_fetched);
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod identity;
mod synchronizer;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, DEFAULT_SEARCH_LIMIT};
pub use identity::deterministic_id;
pub use synchronizer::{SyncReport, SyncRequest, Synchronizer};
