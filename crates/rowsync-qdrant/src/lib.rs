//! Qdrant vector index for Rowsync.
//!
//! [`QdrantIndex`] implements [`VectorIndex`](rowsync_core::VectorIndex) over
//! [Qdrant](https://qdrant.tech/). Each point carries the rendered document as
//! its payload (`text`, `source`, `owner_id`, `data_id`); the last three get
//! keyword indexes so filtered deletes and searches stay cheap.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowsync_core::VectorIndex;
//! use rowsync_qdrant::{QdrantConfig, QdrantIndex};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QdrantConfig::new("http://localhost:6334", "documents", 384);
//! let index = QdrantIndex::new(config)?;
//! index.ensure_collection().await?;
//! # Ok(())
//! # }
//! ```

mod index;

pub use index::{QdrantConfig, QdrantIndex};

pub use rowsync_core::VectorIndex;
