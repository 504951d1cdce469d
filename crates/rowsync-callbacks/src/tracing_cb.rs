use async_trait::async_trait;
use rowsync_core::{RowsyncError, SyncCallback, SyncEvent};

pub struct TracingCallback;

impl TracingCallback {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncCallback for TracingCallback {
    async fn on_event(&self, event: SyncEvent) -> Result<(), RowsyncError> {
        match event {
            SyncEvent::RunStarted {
                run_id,
                source,
                base_table,
            } => {
                tracing::info!(run_id = %run_id, source = %source, base_table = %base_table, "sync started");
            }
            SyncEvent::PageFetched { run_id, page, rows } => {
                tracing::info!(run_id = %run_id, page, rows, "page fetched");
            }
            SyncEvent::DocumentUpserted {
                run_id,
                point_id,
                data_id,
            } => {
                tracing::debug!(run_id = %run_id, point_id = %point_id, data_id = %data_id, "document upserted");
            }
            SyncEvent::RunFinished {
                run_id,
                rows_processed,
            } => {
                tracing::info!(run_id = %run_id, rows_processed, "sync finished");
            }
            SyncEvent::RunFailed { run_id, error } => {
                tracing::error!(run_id = %run_id, error = %error, "sync failed");
            }
        }
        Ok(())
    }
}
