//! Relational side of Rowsync.
//!
//! - [`PgSource`] and [`SqliteSource`] implement the
//!   [`SchemaIntrospector`](rowsync_core::SchemaIntrospector) and
//!   [`RelationalSource`](rowsync_core::RelationalSource) collaborators.
//! - [`JoinPlanner`] turns a [`TableColumnMap`](rowsync_core::TableColumnMap)
//!   into a single foreign-key join query ([`JoinPlan`]).
//! - [`PageScanner`] runs a plan page by page and yields flattened rows.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use rowsync_core::TableColumnMap;
//! use rowsync_sql::{JoinPlanner, SqliteSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SqliteSource::in_memory("shop").await?;
//! let mut columns = TableColumnMap::new();
//! columns.insert("orders", "total");
//! columns.insert("customers", "name");
//!
//! let plan = JoinPlanner::new(&source).plan(&columns, None, 100).await?;
//! println!("{}", plan.sql());
//! # Ok(())
//! # }
//! ```

mod flatten;
mod ident;
mod join;
mod postgres;
mod scan;
mod sqlite;

pub use flatten::{flatten_row, split_alias};
pub use ident::quote_ident;
pub use join::{JoinClause, JoinPlan, JoinPlanner, SelectColumn};
pub use postgres::PgSource;
pub use scan::{PageScanner, ScannedPage};
pub use sqlite::SqliteSource;

use rowsync_core::{RelationalSource, RowSet, RowsyncError};

/// Run a caller-supplied query, refusing anything but a single `SELECT`.
///
/// One trailing `;` is allowed. Any other statement separator outside a
/// quoted literal or identifier is rejected, so nothing can be stacked
/// behind the `SELECT`.
pub async fn read_only_query<S>(source: &S, sql: &str) -> Result<RowSet, RowsyncError>
where
    S: RelationalSource + ?Sized,
{
    let statement = single_statement(sql)?;
    if !statement.to_uppercase().starts_with("SELECT") {
        return Err(RowsyncError::Validation(
            "only SELECT queries are allowed".to_string(),
        ));
    }
    source.fetch(statement).await
}

/// Trim `sql` and its optional trailing `;`, rejecting multiple statements.
fn single_statement(sql: &str) -> Result<&str, RowsyncError> {
    let trimmed = sql.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    let mut quote: Option<char> = None;
    for c in statement.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ';') => {
                return Err(RowsyncError::Validation(
                    "only a single statement is allowed".to_string(),
                ))
            }
            (None, _) => {}
        }
    }
    Ok(statement)
}
