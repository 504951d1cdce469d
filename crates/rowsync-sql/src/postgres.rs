use async_trait::async_trait;
use rowsync_core::{
    ColumnInfo, ForeignKeyRelation, RelationalSource, RowSet, RowsyncError, SchemaIntrospector,
    TableSchema,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::ident::quote_ident;

const LIST_TABLES: &str = "\
SELECT c.table_name::text AS table_name, c.column_name::text AS column_name, \
       c.data_type::text AS data_type, (c.is_nullable = 'YES') AS nullable \
FROM information_schema.columns c \
JOIN information_schema.tables t \
  ON c.table_schema = t.table_schema AND c.table_name = t.table_name \
WHERE t.table_schema = $1 AND t.table_type = 'BASE TABLE' \
ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEY: &str = "\
SELECT a.attname::text AS column_name \
FROM pg_index i \
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
WHERE i.indrelid = to_regclass($1) AND i.indisprimary \
ORDER BY a.attnum LIMIT 1";

const UNIQUE_COLUMN: &str = "\
SELECT a.attname::text AS column_name \
FROM pg_index i \
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
WHERE i.indrelid = to_regclass($1) AND i.indisunique \
ORDER BY i.indisprimary DESC, a.attnum LIMIT 1";

const FOREIGN_KEYS: &str = "\
SELECT tc.table_name::text AS source_table, kcu.column_name::text AS source_column, \
       ccu.table_name::text AS target_table, ccu.column_name::text AS target_column \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage kcu \
  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
JOIN information_schema.constraint_column_usage ccu \
  ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1 \
ORDER BY tc.table_name, kcu.ordinal_position";

/// A PostgreSQL database introspected through `information_schema` and `pg_index`.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
    database: String,
    schema: String,
}

impl PgSource {
    pub fn new(pool: PgPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
            schema: "public".to_string(),
        }
    }

    /// Connect with a pool of up to five connections.
    pub async fn connect_with(options: PgConnectOptions) -> Result<Self, RowsyncError> {
        let database = options.get_database().unwrap_or("postgres").to_string();
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| RowsyncError::Database(format!("postgres connect: {e}")))?;
        Ok(Self::new(pool, database))
    }

    /// Introspect a schema other than `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    async fn index_column(&self, sql: &str, table: &str, what: &str) -> Result<String, RowsyncError> {
        let row = sqlx::query(sql)
            .bind(self.qualified(table))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RowsyncError::Schema(format!("{what} lookup for {table}: {e}")))?;
        row.map(|r| r.get::<String, _>("column_name"))
            .ok_or_else(|| RowsyncError::Schema(format!("no {what} for table {table}")))
    }
}

#[async_trait]
impl SchemaIntrospector for PgSource {
    async fn list_tables(&self) -> Result<Vec<TableSchema>, RowsyncError> {
        let rows = sqlx::query(LIST_TABLES)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RowsyncError::Schema(format!("list tables: {e}")))?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in &rows {
            let table: String = row.get("table_name");
            let column = ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: row.get("nullable"),
            };
            match tables.last_mut() {
                Some(last) if last.name == table => last.columns.push(column),
                _ => tables.push(TableSchema {
                    name: table,
                    columns: vec![column],
                }),
            }
        }
        Ok(tables)
    }

    async fn primary_key(&self, table: &str) -> Result<String, RowsyncError> {
        self.index_column(PRIMARY_KEY, table, "primary key").await
    }

    async fn unique_column(&self, table: &str) -> Result<String, RowsyncError> {
        self.index_column(UNIQUE_COLUMN, table, "unique column").await
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyRelation>, RowsyncError> {
        let rows = sqlx::query(FOREIGN_KEYS)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RowsyncError::Schema(format!("foreign keys: {e}")))?;

        Ok(rows
            .iter()
            .map(|row| {
                ForeignKeyRelation::new(
                    row.get::<String, _>("source_table"),
                    row.get::<String, _>("source_column"),
                    row.get::<String, _>("target_table"),
                    row.get::<String, _>("target_column"),
                )
            })
            .collect())
    }
}

#[async_trait]
impl RelationalSource for PgSource {
    fn database(&self) -> &str {
        &self.database
    }

    /// Runs over the simple query protocol so every value arrives as text,
    /// including NUMERIC and other types without a native decoder.
    async fn fetch(&self, sql: &str) -> Result<RowSet, RowsyncError> {
        let rows = sqlx::raw_sql(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RowsyncError::Database(format!("query failed: {e}")))?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = (0..row.len())
                .map(|i| pg_value(row, i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RowsyncError::Database(format!("decode failed: {e}")))?;
            values.push(decoded);
        }
        Ok(RowSet::new(columns, values))
    }
}

fn pg_value(row: &PgRow, index: usize) -> Result<Value, sqlx::Error> {
    let text = row.try_get_unchecked::<Option<String>, _>(index)?;
    let type_name = row.column(index).type_info().name();
    Ok(match text {
        None => Value::Null,
        Some(text) => text_to_value(type_name, text),
    })
}

/// Map a text-format PostgreSQL value to JSON by column type.
///
/// Integers, floats and booleans become JSON scalars, `bytea` is decoded
/// from its hex form to (lossy) UTF-8, everything else stays text.
pub(crate) fn text_to_value(type_name: &str, text: String) -> Value {
    match type_name {
        "INT2" | "INT4" | "INT8" => text.parse::<i64>().map(Value::from).unwrap_or(Value::String(text)),
        "FLOAT4" | "FLOAT8" => match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Value::from(v),
            _ => Value::String(text),
        },
        "BOOL" => match text.as_str() {
            "t" => Value::Bool(true),
            "f" => Value::Bool(false),
            _ => Value::String(text),
        },
        "BYTEA" => match decode_bytea_hex(&text) {
            Some(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            None => Value::String(text),
        },
        _ => Value::String(text),
    }
}

fn decode_bytea_hex(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_stays_text() {
        assert_eq!(text_to_value("NUMERIC", "49.99".to_string()), json!("49.99"));
    }

    #[test]
    fn integers_and_floats_become_numbers() {
        assert_eq!(text_to_value("INT4", "42".to_string()), json!(42));
        assert_eq!(text_to_value("FLOAT8", "1.5".to_string()), json!(1.5));
    }

    #[test]
    fn booleans_decode_from_t_and_f() {
        assert_eq!(text_to_value("BOOL", "t".to_string()), json!(true));
        assert_eq!(text_to_value("BOOL", "f".to_string()), json!(false));
    }

    #[test]
    fn bytea_decodes_to_text() {
        assert_eq!(text_to_value("BYTEA", "\\x4869".to_string()), json!("Hi"));
        assert_eq!(text_to_value("BYTEA", "\\x4".to_string()), json!("\\x4"));
    }

    #[test]
    fn non_finite_floats_stay_text() {
        assert_eq!(text_to_value("FLOAT8", "NaN".to_string()), json!("NaN"));
    }
}
