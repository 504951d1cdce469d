use async_trait::async_trait;
use rowsync_core::{
    ColumnInfo, ForeignKeyRelation, RelationalSource, RowSet, RowsyncError, SchemaIntrospector,
    TableSchema,
};
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

/// A SQLite database seen through its `sqlite_master` table and pragmas.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
    database: String,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    /// A private in-memory database on a single connection.
    pub async fn in_memory(database: impl Into<String>) -> Result<Self, RowsyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RowsyncError::Database(format!("sqlite connect: {e}")))?;
        Ok(Self::new(pool, database))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_table(&self, table: &str) -> Result<(), RowsyncError> {
        let found = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RowsyncError::Schema(format!("table lookup for {table}: {e}")))?;
        if found.is_none() {
            return Err(RowsyncError::Schema(format!("unknown table {table}")));
        }
        Ok(())
    }

    async fn declared_primary_key(&self, table: &str) -> Result<Option<String>, RowsyncError> {
        let row = sqlx::query("SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk LIMIT 1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RowsyncError::Schema(format!("primary key lookup for {table}: {e}")))?;
        Ok(row.map(|r| r.get::<String, _>("name")))
    }
}

#[async_trait]
impl SchemaIntrospector for SqliteSource {
    async fn list_tables(&self) -> Result<Vec<TableSchema>, RowsyncError> {
        let rows = sqlx::query(
            "SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type, \
             p.\"notnull\" AS not_null \
             FROM sqlite_master m JOIN pragma_table_info(m.name) p \
             WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' \
             ORDER BY m.name, p.cid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RowsyncError::Schema(format!("list tables: {e}")))?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in &rows {
            let table: String = row.get("table_name");
            let column = ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: row.get::<i64, _>("not_null") == 0,
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
        self.ensure_table(table).await?;
        self.declared_primary_key(table)
            .await?
            .ok_or_else(|| RowsyncError::Schema(format!("no primary key for table {table}")))
    }

    async fn unique_column(&self, table: &str) -> Result<String, RowsyncError> {
        self.ensure_table(table).await?;
        if let Some(pk) = self.declared_primary_key(table).await? {
            return Ok(pk);
        }
        let row = sqlx::query(
            "SELECT ii.name AS name \
             FROM pragma_index_list(?) il JOIN pragma_index_info(il.name) ii \
             WHERE il.\"unique\" = 1 \
             ORDER BY il.seq, ii.seqno LIMIT 1",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RowsyncError::Schema(format!("unique column lookup for {table}: {e}")))?;
        row.map(|r| r.get::<String, _>("name"))
            .ok_or_else(|| RowsyncError::Schema(format!("no unique column for table {table}")))
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyRelation>, RowsyncError> {
        let rows = sqlx::query(
            "SELECT m.name AS source_table, f.\"from\" AS source_column, \
             f.\"table\" AS target_table, f.\"to\" AS target_column \
             FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) f \
             WHERE m.type = 'table' \
             ORDER BY m.name, f.id, f.seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RowsyncError::Schema(format!("foreign keys: {e}")))?;

        let mut relations = Vec::with_capacity(rows.len());
        for row in &rows {
            let target_table: String = row.get("target_table");
            // `REFERENCES parent` without a column list points at the parent's key.
            let target_column = match row.get::<Option<String>, _>("target_column") {
                Some(column) => column,
                None => self.primary_key(&target_table).await?,
            };
            relations.push(ForeignKeyRelation::new(
                row.get::<String, _>("source_table"),
                row.get::<String, _>("source_column"),
                target_table,
                target_column,
            ));
        }
        Ok(relations)
    }
}

#[async_trait]
impl RelationalSource for SqliteSource {
    fn database(&self) -> &str {
        &self.database
    }

    async fn fetch(&self, sql: &str) -> Result<RowSet, RowsyncError> {
        let rows = sqlx::query(sql)
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
                .map(|i| sqlite_value(row, i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RowsyncError::Database(format!("decode failed: {e}")))?;
            values.push(decoded);
        }
        Ok(RowSet::new(columns, values))
    }
}

/// Decode by storage class, honouring a declared BOOLEAN column.
fn sqlite_value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();
    let declared = row.column(index).type_info().name().to_ascii_uppercase();

    let value = if declared == "BOOLEAN" || declared == "BOOL" {
        Value::Bool(row.try_get_unchecked::<bool, _>(index)?)
    } else {
        match storage.as_str() {
            "INTEGER" | "INT" | "BIGINT" | "INT8" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
            "REAL" | "FLOAT" | "DOUBLE" => Value::from(row.try_get_unchecked::<f64, _>(index)?),
            "BLOB" => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
        }
    };
    Ok(value)
}
