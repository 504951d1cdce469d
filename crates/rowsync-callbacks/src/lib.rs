mod composite;
mod tracing_cb;

pub use composite::CompositeCallback;
pub use tracing_cb::TracingCallback;

use std::sync::Arc;

use async_trait::async_trait;
use rowsync_core::{RowsyncError, SyncCallback, SyncEvent};
use tokio::sync::RwLock;

/// Records every received event for later inspection, useful for testing.
#[derive(Default, Clone)]
pub struct RecordingCallback {
    events: Arc<RwLock<Vec<SyncEvent>>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SyncEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl SyncCallback for RecordingCallback {
    async fn on_event(&self, event: SyncEvent) -> Result<(), RowsyncError> {
        self.events.write().await.push(event);
        Ok(())
    }
}
