use std::sync::Arc;

use async_trait::async_trait;
use rowsync_callbacks::{CompositeCallback, RecordingCallback, TracingCallback};
use rowsync_core::{RowsyncError, SyncCallback, SyncEvent};

struct FailingCallback;

#[async_trait]
impl SyncCallback for FailingCallback {
    async fn on_event(&self, _event: SyncEvent) -> Result<(), RowsyncError> {
        Err(RowsyncError::Callback("sink unavailable".to_string()))
    }
}

fn page(run_id: &str, page: usize) -> SyncEvent {
    SyncEvent::PageFetched {
        run_id: run_id.to_string(),
        page,
        rows: 100,
    }
}

#[tokio::test]
async fn recording_concurrent_events() {
    let recorder = Arc::new(RecordingCallback::new());
    let mut handles = Vec::new();

    for i in 0..20 {
        let r = recorder.clone();
        handles.push(tokio::spawn(async move {
            r.on_event(page("r", i)).await.unwrap();
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(recorder.events().await.len(), 20);
}

#[tokio::test]
async fn recording_keeps_order() {
    let recorder = RecordingCallback::new();
    recorder
        .on_event(SyncEvent::RunStarted {
            run_id: "r1".into(),
            source: "shop/products".into(),
            base_table: "products".into(),
        })
        .await
        .unwrap();
    recorder
        .on_event(SyncEvent::RunFinished {
            run_id: "r1".into(),
            rows_processed: 3,
        })
        .await
        .unwrap();

    let events = recorder.events().await;
    assert!(matches!(events[0], SyncEvent::RunStarted { .. }));
    assert!(matches!(
        events[1],
        SyncEvent::RunFinished {
            rows_processed: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn composite_fans_out() {
    let r1 = Arc::new(RecordingCallback::new());
    let r2 = Arc::new(RecordingCallback::new());

    let composite = CompositeCallback::new(vec![
        r1.clone() as Arc<dyn SyncCallback>,
        Arc::new(TracingCallback::new()),
        r2.clone() as Arc<dyn SyncCallback>,
    ]);
    composite.on_event(page("r1", 0)).await.unwrap();

    assert_eq!(r1.events().await, vec![page("r1", 0)]);
    assert_eq!(r2.events().await, vec![page("r1", 0)]);
}

#[tokio::test]
async fn composite_stops_at_first_error() {
    let after = Arc::new(RecordingCallback::new());
    let composite = CompositeCallback::new(vec![
        Arc::new(FailingCallback) as Arc<dyn SyncCallback>,
        after.clone() as Arc<dyn SyncCallback>,
    ]);

    let err = composite.on_event(page("r1", 0)).await.unwrap_err();
    assert!(matches!(err, RowsyncError::Callback(_)));
    assert!(after.events().await.is_empty());
}

#[tokio::test]
async fn tracing_callback_accepts_every_event() {
    let cb = TracingCallback::default();
    for event in [
        SyncEvent::RunStarted {
            run_id: "r".into(),
            source: "s".into(),
            base_table: "t".into(),
        },
        page("r", 0),
        SyncEvent::DocumentUpserted {
            run_id: "r".into(),
            point_id: "p".into(),
            data_id: "1".into(),
        },
        SyncEvent::RunFinished {
            run_id: "r".into(),
            rows_processed: 1,
        },
        SyncEvent::RunFailed {
            run_id: "r".into(),
            error: "boom".into(),
        },
    ] {
        cb.on_event(event).await.unwrap();
    }
}
