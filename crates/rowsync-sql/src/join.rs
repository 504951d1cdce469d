use std::collections::{BTreeMap, HashMap};

use rowsync_core::{
    FlatRow, ForeignKeyRelation, RowsyncError, SchemaIntrospector, TableColumnMap, TableSchema,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::flatten::split_alias;
use crate::ident::quote_ident;

// ---------------------------------------------------------------------------
// Plan pieces
// ---------------------------------------------------------------------------

/// One projected column, selected as `"table"."column" AS "table_column"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    pub table: String,
    pub column: String,
    pub alias: String,
}

impl SelectColumn {
    fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            alias: format!("{table}_{column}"),
        }
    }

    fn to_sql(&self) -> String {
        format!(
            "{}.{} AS {}",
            quote_ident(&self.table),
            quote_ident(&self.column),
            quote_ident(&self.alias)
        )
    }
}

/// An inner join of `table` onto the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    /// `(table, column)` on the left of the equality.
    pub left: (String, String),
    /// `(table, column)` on the right of the equality.
    pub right: (String, String),
    /// `table` references the base table, so one base row can match many
    /// rows of `table`.
    pub fans_out: bool,
}

impl JoinClause {
    fn to_sql(&self) -> String {
        format!(
            "JOIN {} ON {}.{} = {}.{}",
            quote_ident(&self.table),
            quote_ident(&self.left.0),
            quote_ident(&self.left.1),
            quote_ident(&self.right.0),
            quote_ident(&self.right.1),
        )
    }
}

// ---------------------------------------------------------------------------
// JoinPlan
// ---------------------------------------------------------------------------

/// A synthesized single-query join over every table a template references.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    base_table: String,
    selects: Vec<SelectColumn>,
    joins: Vec<JoinClause>,
    key_columns: BTreeMap<String, String>,
    page_size: usize,
    aliases: HashMap<String, (String, String)>,
    sql: String,
}

impl JoinPlan {
    fn new(
        base_table: String,
        selects: Vec<SelectColumn>,
        joins: Vec<JoinClause>,
        key_columns: BTreeMap<String, String>,
        page_size: usize,
    ) -> Self {
        let aliases = selects
            .iter()
            .map(|s| (s.alias.clone(), (s.table.clone(), s.column.clone())))
            .collect();

        let projection = selects
            .iter()
            .map(SelectColumn::to_sql)
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {projection} FROM {}", quote_ident(&base_table));
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        // Base key first, then each joined table's key: the tuple is unique per
        // joined row, which keeps LIMIT/OFFSET pages disjoint.
        let mut order = Vec::new();
        if let Some(key) = key_columns.get(&base_table) {
            order.push(format!("{}.{}", quote_ident(&base_table), quote_ident(key)));
        }
        for join in &joins {
            if let Some(key) = key_columns.get(&join.table) {
                order.push(format!("{}.{}", quote_ident(&join.table), quote_ident(key)));
            }
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        sql.push_str(&format!(" LIMIT {page_size}"));

        Self {
            base_table,
            selects,
            joins,
            key_columns,
            page_size,
            aliases,
            sql,
        }
    }

    /// The query for the first page.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The query for page `page` (0-based).
    pub fn page_sql(&self, page: usize) -> String {
        format!("{} OFFSET {}", self.sql, page * self.page_size)
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn selects(&self) -> &[SelectColumn] {
        &self.selects
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    /// The unique column used to identify rows of `table`.
    pub fn key_column(&self, table: &str) -> Option<&str> {
        self.key_columns.get(table).map(String::as_str)
    }

    /// The base table's key value for `row`, or `None` when it is absent or NULL.
    pub fn natural_key<'r>(&self, row: &'r FlatRow) -> Option<&'r Value> {
        let key = self.key_column(&self.base_table)?;
        row.get(&self.base_table, key).filter(|v| !v.is_null())
    }

    /// Regroup a result row of this plan by table.
    ///
    /// Known aliases resolve exactly, so table names that contain
    /// underscores survive. Unknown columns fall back to the first-underscore
    /// split.
    pub fn flatten(&self, columns: &[String], values: &[Value]) -> FlatRow {
        let mut row = FlatRow::new();
        for (column, value) in columns.iter().zip(values) {
            if let Some((table, field)) = self.aliases.get(column) {
                row.insert(table.as_str(), field.as_str(), value.clone());
            } else if let Some((table, field)) = split_alias(column) {
                row.insert(table, field, value.clone());
            }
        }
        row
    }
}

// ---------------------------------------------------------------------------
// JoinPlanner
// ---------------------------------------------------------------------------

/// Builds a [`JoinPlan`] from a [`TableColumnMap`] and the live catalog.
pub struct JoinPlanner<'a, I: SchemaIntrospector + ?Sized> {
    introspector: &'a I,
}

impl<'a, I: SchemaIntrospector + ?Sized> JoinPlanner<'a, I> {
    pub fn new(introspector: &'a I) -> Self {
        Self { introspector }
    }

    /// Plan the join.
    ///
    /// `base_table` defaults to the first table of `columns`. Every table is
    /// checked against the catalog, augmented with its unique column, and
    /// joined to the base table through a foreign key in either direction.
    ///
    /// Rows are identified by the base table's key only. When a joined table
    /// references the base table (one-to-many), every match of one base row
    /// shares that key, so later documents overwrite earlier ones. Anchor on
    /// the child table to get one document per child row.
    pub async fn plan(
        &self,
        columns: &TableColumnMap,
        base_table: Option<&str>,
        page_size: usize,
    ) -> Result<JoinPlan, RowsyncError> {
        if page_size == 0 {
            return Err(RowsyncError::Config("page size must be positive".to_string()));
        }
        let base = match base_table {
            Some(base) if columns.contains_table(base) => base.to_string(),
            Some(base) => {
                return Err(RowsyncError::Validation(format!(
                    "base table {base} is not referenced by the template"
                )))
            }
            None => columns
                .first_table()
                .ok_or_else(|| {
                    RowsyncError::Validation("template references no table columns".to_string())
                })?
                .to_string(),
        };

        let catalog = self.introspector.list_tables().await?;
        check_against_catalog(columns, &catalog)?;

        let mut projected = columns.clone();
        let mut key_columns = BTreeMap::new();
        for table in columns.tables() {
            let key = self.introspector.unique_column(table).await?;
            if projected.insert(table, key.as_str()) {
                debug!(table, column = %key, "added key column to projection");
            }
            key_columns.insert(table.to_string(), key);
        }

        let selects: Vec<SelectColumn> = projected
            .iter()
            .flat_map(|(table, cols)| cols.iter().map(move |col| SelectColumn::new(table, col)))
            .collect();
        for (i, select) in selects.iter().enumerate() {
            if selects[..i].iter().any(|s| s.alias == select.alias) {
                return Err(RowsyncError::Join(format!(
                    "ambiguous column alias {}",
                    select.alias
                )));
            }
        }

        let relations = self.introspector.foreign_keys().await?;
        let mut joins = Vec::new();
        for table in projected.tables().filter(|t| *t != base) {
            let clause = find_join(&base, table, &relations).ok_or_else(|| {
                RowsyncError::Join(format!("no relation found between {base} and {table}"))
            })?;
            if clause.fans_out {
                warn!(
                    base_table = %base,
                    table,
                    "joined table references the base table; rows sharing a base key overwrite each other"
                );
            }
            joins.push(clause);
        }

        let plan = JoinPlan::new(base, selects, joins, key_columns, page_size);
        debug!(sql = plan.sql(), "planned join");
        Ok(plan)
    }
}

/// Reject any table or column the catalog does not know.
fn check_against_catalog(
    columns: &TableColumnMap,
    catalog: &[TableSchema],
) -> Result<(), RowsyncError> {
    for (table, cols) in columns.iter() {
        let schema = catalog
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| RowsyncError::Schema(format!("unknown table {table}")))?;
        if let Some(col) = cols.iter().find(|c| !schema.has_column(c)) {
            return Err(RowsyncError::Schema(format!("unknown column {table}.{col}")));
        }
    }
    Ok(())
}

fn find_join(base: &str, table: &str, relations: &[ForeignKeyRelation]) -> Option<JoinClause> {
    relations.iter().find_map(|rel| {
        if rel.source_table == base && rel.target_table == table {
            Some(JoinClause {
                table: table.to_string(),
                left: (base.to_string(), rel.source_column.clone()),
                right: (table.to_string(), rel.target_column.clone()),
                fans_out: false,
            })
        } else if rel.source_table == table && rel.target_table == base {
            Some(JoinClause {
                table: table.to_string(),
                left: (base.to_string(), rel.target_column.clone()),
                right: (table.to_string(), rel.source_column.clone()),
                fans_out: true,
            })
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rowsync_core::ColumnInfo;

    struct StaticCatalog {
        tables: Vec<TableSchema>,
        relations: Vec<ForeignKeyRelation>,
    }

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                })
                .collect(),
        }
    }

    fn shop() -> StaticCatalog {
        StaticCatalog {
            tables: vec![
                table("customers", &["id", "name"]),
                table("orders", &["id", "customer_id", "total"]),
                table("warehouses", &["id", "city"]),
            ],
            relations: vec![ForeignKeyRelation::new("orders", "customer_id", "customers", "id")],
        }
    }

    #[async_trait]
    impl SchemaIntrospector for StaticCatalog {
        async fn list_tables(&self) -> Result<Vec<TableSchema>, RowsyncError> {
            Ok(self.tables.clone())
        }

        async fn primary_key(&self, _table: &str) -> Result<String, RowsyncError> {
            Ok("id".to_string())
        }

        async fn unique_column(&self, _table: &str) -> Result<String, RowsyncError> {
            Ok("id".to_string())
        }

        async fn foreign_keys(&self) -> Result<Vec<ForeignKeyRelation>, RowsyncError> {
            Ok(self.relations.clone())
        }
    }

    fn map(pairs: &[(&str, &str)]) -> TableColumnMap {
        let mut map = TableColumnMap::new();
        for (t, c) in pairs {
            map.insert(*t, *c);
        }
        map
    }

    #[tokio::test]
    async fn single_table_plan_adds_key_column() {
        let catalog = shop();
        let plan = JoinPlanner::new(&catalog)
            .plan(&map(&[("customers", "name")]), None, 100)
            .await
            .unwrap();
        assert_eq!(
            plan.sql(),
            "SELECT \"customers\".\"name\" AS \"customers_name\", \"customers\".\"id\" AS \"customers_id\" \
             FROM \"customers\" ORDER BY \"customers\".\"id\" LIMIT 100"
        );
        assert_eq!(plan.key_column("customers"), Some("id"));
    }

    #[tokio::test]
    async fn joins_child_to_parent() {
        let catalog = shop();
        let plan = JoinPlanner::new(&catalog)
            .plan(&map(&[("orders", "total"), ("customers", "name")]), None, 10)
            .await
            .unwrap();
        assert_eq!(plan.base_table(), "orders");
        assert_eq!(
            plan.joins()[0].to_sql(),
            "JOIN \"customers\" ON \"orders\".\"customer_id\" = \"customers\".\"id\""
        );
        assert!(!plan.joins()[0].fans_out);
    }

    #[tokio::test]
    async fn joins_parent_to_child() {
        let catalog = shop();
        let plan = JoinPlanner::new(&catalog)
            .plan(&map(&[("customers", "name"), ("orders", "total")]), None, 10)
            .await
            .unwrap();
        assert_eq!(
            plan.joins()[0].to_sql(),
            "JOIN \"orders\" ON \"customers\".\"id\" = \"orders\".\"customer_id\""
        );
        assert!(plan.joins()[0].fans_out);
    }

    #[tokio::test]
    async fn missing_relation_is_a_join_error() {
        let catalog = shop();
        let err = JoinPlanner::new(&catalog)
            .plan(&map(&[("orders", "total"), ("warehouses", "city")]), None, 10)
            .await
            .unwrap_err();
        match err {
            RowsyncError::Join(msg) => {
                assert_eq!(msg, "no relation found between orders and warehouses")
            }
            other => panic!("expected join error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_identifiers_are_rejected() {
        let catalog = shop();
        let planner = JoinPlanner::new(&catalog);

        let err = planner
            .plan(&map(&[("users\"; DROP TABLE x; --", "id")]), None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RowsyncError::Schema(_)));

        let err = planner
            .plan(&map(&[("orders", "secret")]), None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RowsyncError::Schema(_)));
    }

    #[tokio::test]
    async fn explicit_base_must_be_referenced() {
        let catalog = shop();
        let err = JoinPlanner::new(&catalog)
            .plan(&map(&[("orders", "total")]), Some("customers"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RowsyncError::Validation(_)));
    }

    #[tokio::test]
    async fn page_sql_offsets_by_page_size() {
        let catalog = shop();
        let plan = JoinPlanner::new(&catalog)
            .plan(&map(&[("customers", "name")]), None, 25)
            .await
            .unwrap();
        assert!(plan.page_sql(0).ends_with("LIMIT 25 OFFSET 0"));
        assert!(plan.page_sql(3).ends_with("LIMIT 25 OFFSET 75"));
    }

    #[tokio::test]
    async fn flatten_resolves_underscored_table_names() {
        let catalog = StaticCatalog {
            tables: vec![table("order_items", &["id", "unit_price"])],
            relations: vec![],
        };
        let plan = JoinPlanner::new(&catalog)
            .plan(&map(&[("order_items", "unit_price")]), None, 10)
            .await
            .unwrap();
        let row = plan.flatten(
            &["order_items_unit_price".to_string(), "order_items_id".to_string()],
            &[serde_json::json!(4.5), serde_json::json!(7)],
        );
        assert_eq!(row.get("order_items", "unit_price"), Some(&serde_json::json!(4.5)));
        assert_eq!(plan.natural_key(&row), Some(&serde_json::json!(7)));
    }
}
