use rowsync_core::FlatRow;
use serde_json::Value;

/// Split a `table_field` alias on its first underscore.
pub fn split_alias(alias: &str) -> Option<(&str, &str)> {
    alias.split_once('_')
}

/// Regroup one result row whose columns follow the `table_field` naming
/// convention. Columns without an underscore are dropped.
pub fn flatten_row(columns: &[String], values: &[Value]) -> FlatRow {
    let mut row = FlatRow::new();
    for (column, value) in columns.iter().zip(values) {
        if let Some((table, field)) = split_alias(column) {
            row.insert(table, field, value.clone());
        }
    }
    row
}
