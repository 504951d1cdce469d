use async_stream::try_stream;
use futures::Stream;
use rowsync_core::{FlatRow, RelationalSource, RowsyncError};
use tracing::debug;

use crate::join::JoinPlan;

/// One fetched page of flattened rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedPage {
    /// 0-based page number.
    pub index: usize,
    pub rows: Vec<FlatRow>,
}

/// Runs a [`JoinPlan`] page by page.
///
/// Pages are fetched lazily as the stream is polled. The scan stops after the
/// first page that returns fewer rows than the page size, so a row count that
/// is an exact multiple of the page size costs one extra, empty query.
pub struct PageScanner<'a, S: RelationalSource + ?Sized> {
    source: &'a S,
    plan: &'a JoinPlan,
}

impl<'a, S: RelationalSource + ?Sized> PageScanner<'a, S> {
    pub fn new(source: &'a S, plan: &'a JoinPlan) -> Self {
        Self { source, plan }
    }

    /// Stream of pages. A failed fetch ends the stream with that error.
    pub fn scan(&self) -> impl Stream<Item = Result<ScannedPage, RowsyncError>> + Send + 'a {
        let source = self.source;
        let plan = self.plan;
        try_stream! {
            let mut index = 0;
            loop {
                let sql = plan.page_sql(index);
                let set = source.fetch(&sql).await?;
                let count = set.len();
                debug!(page = index, rows = count, "fetched page");

                let rows = set
                    .rows
                    .iter()
                    .map(|values| plan.flatten(&set.columns, values))
                    .collect();
                yield ScannedPage { index, rows };

                if count < plan.page_size() {
                    break;
                }
                index += 1;
            }
        }
    }

    /// Stream of rows across all pages.
    pub fn rows(&self) -> impl Stream<Item = Result<FlatRow, RowsyncError>> + Send + 'a {
        let pages = self.scan();
        try_stream! {
            futures::pin_mut!(pages);
            while let Some(page) = futures::StreamExt::next(&mut pages).await {
                for row in page?.rows {
                    yield row;
                }
            }
        }
    }
}
