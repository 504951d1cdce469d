use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use rowsync_core::{
    scalar_to_text, CancelToken, PointId, RelationalSource, RenderedDocument, RowsyncError,
    SyncCallback, SyncEvent,
};
use rowsync_sql::{JoinPlan, JoinPlanner, PageScanner};
use rowsync_template::DocumentTemplate;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::identity::deterministic_id;

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// One sync request: which rows to render, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub template: String,
    pub owner_id: String,
    /// Anchor table of the join. Defaults to the first table the template names.
    pub base_table: Option<String>,
    /// Payload `source`. Defaults to `<database>/<base_table>`.
    pub source: Option<String>,
}

impl SyncRequest {
    pub fn new(template: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            owner_id: owner_id.into(),
            base_table: None,
            source: None,
        }
    }

    pub fn with_base_table(mut self, base_table: impl Into<String>) -> Self {
        self.base_table = Some(base_table.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub source: String,
    pub rows_processed: usize,
    pub pages_fetched: usize,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Races every await of a run against cancellation and the deadline.
#[derive(Clone)]
struct RunGuard {
    caller: CancelToken,
    aborted: CancelToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    async fn run<T, F>(&self, fut: F) -> Result<T, RowsyncError>
    where
        F: Future<Output = Result<T, RowsyncError>>,
    {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.caller.cancelled() => {
                Err(RowsyncError::Cancelled("sync run cancelled by caller".to_string()))
            }
            _ = self.aborted.cancelled() => {
                Err(RowsyncError::Cancelled("sync run aborted after an earlier failure".to_string()))
            }
            _ = expired => Err(RowsyncError::Timeout("sync run exceeded its deadline".to_string())),
            result = fut => result,
        }
    }
}

struct RunState {
    run_id: String,
    guard: RunGuard,
    callback: Option<Arc<dyn SyncCallback>>,
    first_error: Mutex<Option<RowsyncError>>,
}

impl RunState {
    async fn emit(&self, event: SyncEvent) -> Result<(), RowsyncError> {
        match &self.callback {
            Some(callback) => callback.on_event(event).await,
            None => Ok(()),
        }
    }

    /// Keep the first error and stop everything else.
    async fn fail(&self, error: RowsyncError) {
        let mut slot = self.first_error.lock().await;
        if slot.is_none() {
            warn!(run_id = %self.run_id, error = %error, "aborting sync run");
            *slot = Some(error);
        }
        self.guard.aborted.cancel();
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Drives full sync runs from a relational source into a vector index.
///
/// Rendered documents are routed to `concurrency` shard workers by point
/// identity, so every write for one identity goes through the same
/// sequential worker. The first failure cancels the run and is returned;
/// points already written stay written.
pub struct Synchronizer {
    source: Arc<dyn RelationalSource>,
    coordinator: SyncCoordinator,
    config: SyncConfig,
    callback: Option<Arc<dyn SyncCallback>>,
}

impl Synchronizer {
    pub fn new(
        source: Arc<dyn RelationalSource>,
        coordinator: SyncCoordinator,
        config: SyncConfig,
    ) -> Result<Self, RowsyncError> {
        config.validate()?;
        Ok(Self {
            source,
            coordinator,
            config,
            callback: None,
        })
    }

    pub fn with_callback(mut self, callback: Arc<dyn SyncCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run(&self, request: &SyncRequest) -> Result<SyncReport, RowsyncError> {
        self.run_with_cancel(request, &CancelToken::new()).await
    }

    /// Like [`run`](Self::run), stopping with `Cancelled` once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: &SyncRequest,
        cancel: &CancelToken,
    ) -> Result<SyncReport, RowsyncError> {
        let state = Arc::new(RunState {
            run_id: Uuid::new_v4().to_string(),
            guard: RunGuard {
                caller: cancel.clone(),
                aborted: CancelToken::new(),
                deadline: self.config.timeout.map(|t| Instant::now() + t),
            },
            callback: self.callback.clone(),
            first_error: Mutex::new(None),
        });

        match self.execute(&state, request).await {
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    source = %report.source,
                    rows = report.rows_processed,
                    pages = report.pages_fetched,
                    "sync run finished"
                );
                state
                    .emit(SyncEvent::RunFinished {
                        run_id: report.run_id.clone(),
                        rows_processed: report.rows_processed,
                    })
                    .await?;
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %state.run_id, error = %e, "sync run failed");
                let event = SyncEvent::RunFailed {
                    run_id: state.run_id.clone(),
                    error: e.to_string(),
                };
                if let Err(callback_err) = state.emit(event).await {
                    warn!(error = %callback_err, "callback failed while reporting a failed run");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        state: &Arc<RunState>,
        request: &SyncRequest,
    ) -> Result<SyncReport, RowsyncError> {
        if request.owner_id.is_empty() {
            return Err(RowsyncError::Validation("owner_id must not be empty".to_string()));
        }
        let template = DocumentTemplate::parse(&request.template)?;
        let columns = template.table_columns();
        if columns.is_empty() {
            return Err(RowsyncError::Template(
                "template references no table columns".to_string(),
            ));
        }

        let planner = JoinPlanner::new(self.source.as_ref());
        let plan = state
            .guard
            .run(planner.plan(&columns, request.base_table.as_deref(), self.config.page_size))
            .await?;
        let source_name = request
            .source
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.source.database(), plan.base_table()));

        info!(
            run_id = %state.run_id,
            source = %source_name,
            base_table = plan.base_table(),
            concurrency = self.config.concurrency,
            "sync run started"
        );
        state
            .emit(SyncEvent::RunStarted {
                run_id: state.run_id.clone(),
                source: source_name.clone(),
                base_table: plan.base_table().to_string(),
            })
            .await?;

        let mut queues = Vec::with_capacity(self.config.concurrency);
        let mut workers = JoinSet::new();
        for shard in 0..self.config.concurrency {
            let (tx, rx) = mpsc::channel(self.config.queue_depth);
            queues.push(tx);
            workers.spawn(shard_worker(
                shard,
                self.coordinator.clone(),
                rx,
                Arc::clone(state),
            ));
        }

        let scanned = self
            .scan_into(state, &plan, &template, &source_name, &request.owner_id, &queues)
            .await;
        drop(queues);
        let pages_fetched = match scanned {
            Ok(pages) => pages,
            Err(e) => {
                state.fail(e).await;
                0
            }
        };

        let mut rows_processed = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(upserted) => rows_processed += upserted,
                Err(e) => {
                    state
                        .fail(RowsyncError::Cancelled(format!("shard worker stopped: {e}")))
                        .await
                }
            }
        }

        if let Some(e) = state.first_error.lock().await.take() {
            return Err(e);
        }
        Ok(SyncReport {
            run_id: state.run_id.clone(),
            source: source_name,
            rows_processed,
            pages_fetched,
        })
    }

    /// Scan every page, render each row and queue it on its shard.
    /// Returns the number of pages fetched.
    async fn scan_into(
        &self,
        state: &RunState,
        plan: &JoinPlan,
        template: &DocumentTemplate,
        source_name: &str,
        owner_id: &str,
        queues: &[mpsc::Sender<RenderedDocument>],
    ) -> Result<usize, RowsyncError> {
        let scanner = PageScanner::new(self.source.as_ref(), plan);
        let pages = scanner.scan();
        futures::pin_mut!(pages);

        let base = plan.base_table();
        let key_column = plan.key_column(base).unwrap_or_default();
        let mut pages_fetched = 0;

        while let Some(page) = state
            .guard
            .run(async { Ok::<_, RowsyncError>(pages.next().await) })
            .await?
        {
            let page = page?;
            pages_fetched += 1;
            debug!(run_id = %state.run_id, page = page.index, rows = page.rows.len(), "page fetched");
            state
                .emit(SyncEvent::PageFetched {
                    run_id: state.run_id.clone(),
                    page: page.index,
                    rows: page.rows.len(),
                })
                .await?;

            for row in &page.rows {
                let key = plan.natural_key(row).ok_or_else(|| {
                    RowsyncError::Schema(format!(
                        "row of {base} has no value for key column {key_column}"
                    ))
                })?;
                let data_id = scalar_to_text(key);
                let text = template.render(row)?;
                let shard = shard_for(&deterministic_id(source_name, owner_id, &data_id), queues.len());
                let doc = RenderedDocument::new(text, source_name, owner_id, data_id);

                state
                    .guard
                    .run(async {
                        queues[shard].send(doc).await.map_err(|_| {
                            RowsyncError::Cancelled(format!("shard {shard} stopped accepting documents"))
                        })
                    })
                    .await?;
            }
        }
        Ok(pages_fetched)
    }
}

/// Embed and upsert every document queued on one shard, in order.
/// Returns how many documents were written.
async fn shard_worker(
    shard: usize,
    coordinator: SyncCoordinator,
    mut queue: mpsc::Receiver<RenderedDocument>,
    state: Arc<RunState>,
) -> usize {
    let mut upserted = 0;
    while let Some(doc) = queue.recv().await {
        let outcome = match state.guard.run(coordinator.upsert_document(&doc)).await {
            Ok(id) => {
                state
                    .emit(SyncEvent::DocumentUpserted {
                        run_id: state.run_id.clone(),
                        point_id: id.to_string(),
                        data_id: doc.data_id.clone(),
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            state.fail(e).await;
            break;
        }
        upserted += 1;
    }
    debug!(run_id = %state.run_id, shard, upserted, "shard worker finished");
    upserted
}

fn shard_for(id: &PointId, shards: usize) -> usize {
    (id.as_uuid().as_u128() % shards as u128) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn shard_is_stable_and_in_range() {
        let id = deterministic_id("shop/products", "u1", "1");
        for shards in 1..8 {
            let shard = shard_for(&id, shards);
            assert!(shard < shards);
            assert_eq!(shard, shard_for(&id, shards));
        }
    }

    #[test]
    fn request_builder() {
        let request = SyncRequest::new("{{.a.b}}", "u1")
            .with_base_table("a")
            .with_source("custom");
        assert_eq!(request.base_table.as_deref(), Some("a"));
        assert_eq!(request.source.as_deref(), Some("custom"));
    }

    fn guard(deadline: Option<Instant>) -> RunGuard {
        RunGuard {
            caller: CancelToken::new(),
            aborted: CancelToken::new(),
            deadline,
        }
    }

    #[tokio::test]
    async fn guard_passes_results_through() {
        let value = guard(None).run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn guard_reports_caller_cancellation() {
        let g = guard(None);
        g.caller.cancel();
        let err = g.run(std::future::pending::<Result<(), RowsyncError>>()).await.unwrap_err();
        assert!(matches!(err, RowsyncError::Cancelled(_)));
    }

    #[tokio::test]
    async fn guard_reports_deadline() {
        let g = guard(Some(Instant::now() + Duration::from_millis(10)));
        let err = g.run(std::future::pending::<Result<(), RowsyncError>>()).await.unwrap_err();
        assert!(matches!(err, RowsyncError::Timeout(_)));
    }
}
