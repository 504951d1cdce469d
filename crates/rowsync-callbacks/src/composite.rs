use std::sync::Arc;

use async_trait::async_trait;
use rowsync_core::{RowsyncError, SyncCallback, SyncEvent};

/// Forwards each event to every handler in order, stopping at the first error.
pub struct CompositeCallback {
    handlers: Vec<Arc<dyn SyncCallback>>,
}

impl CompositeCallback {
    pub fn new(handlers: Vec<Arc<dyn SyncCallback>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl SyncCallback for CompositeCallback {
    async fn on_event(&self, event: SyncEvent) -> Result<(), RowsyncError> {
        for handler in &self.handlers {
            handler.on_event(event.clone()).await?;
        }
        Ok(())
    }
}
