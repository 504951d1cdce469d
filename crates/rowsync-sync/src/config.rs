use std::time::Duration;

use rowsync_core::RowsyncError;

/// Tuning for a [`Synchronizer`](crate::Synchronizer) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Rows fetched per page.
    pub page_size: usize,
    /// Number of shard workers embedding and upserting in parallel.
    pub concurrency: usize,
    /// Documents buffered per shard before the scanner waits.
    pub queue_depth: usize,
    /// Deadline for the whole run.
    pub timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            concurrency: 1,
            queue_depth: 16,
            timeout: None,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), RowsyncError> {
        if self.page_size == 0 {
            return Err(RowsyncError::Config("page_size must be positive".to_string()));
        }
        if self.concurrency == 0 {
            return Err(RowsyncError::Config("concurrency must be positive".to_string()));
        }
        if self.queue_depth == 0 {
            return Err(RowsyncError::Config("queue_depth must be positive".to_string()));
        }
        Ok(())
    }
}
