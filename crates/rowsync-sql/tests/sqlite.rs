use futures::StreamExt;
use rowsync_core::{RelationalSource, RowsyncError, SchemaIntrospector, TableColumnMap};
use rowsync_sql::{read_only_query, JoinPlanner, PageScanner, SqliteSource};
use serde_json::json;

async fn shop() -> SqliteSource {
    let source = SqliteSource::in_memory("shop").await.unwrap();
    for stmt in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL)",
        "CREATE TABLE tags (label TEXT UNIQUE, note TEXT)",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers, body TEXT)",
        "INSERT INTO customers VALUES (1, 'Ada'), (2, 'Grace')",
        "INSERT INTO orders VALUES (10, 1, 99.5), (11, 2, 12.0), (12, 1, 5.25)",
    ] {
        sqlx::query(stmt).execute(source.pool()).await.unwrap();
    }
    source
}

fn columns(pairs: &[(&str, &str)]) -> TableColumnMap {
    let mut map = TableColumnMap::new();
    for (t, c) in pairs {
        map.insert(*t, *c);
    }
    map
}

#[tokio::test]
async fn lists_tables_with_columns() {
    let source = shop().await;
    let tables = source.list_tables().await.unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["customers", "notes", "orders", "tags"]);

    let customers = &tables[0];
    assert_eq!(customers.columns[0].name, "id");
    assert!(!customers.columns[1].nullable);
}

#[tokio::test]
async fn key_lookups() {
    let source = shop().await;
    assert_eq!(source.primary_key("orders").await.unwrap(), "id");
    assert_eq!(source.unique_column("orders").await.unwrap(), "id");
    assert_eq!(source.unique_column("tags").await.unwrap(), "label");
    assert!(matches!(
        source.primary_key("tags").await.unwrap_err(),
        RowsyncError::Schema(_)
    ));
    assert!(matches!(
        source.unique_column("missing").await.unwrap_err(),
        RowsyncError::Schema(_)
    ));
}

#[tokio::test]
async fn foreign_keys_resolve_implicit_targets() {
    let source = shop().await;
    let relations = source.foreign_keys().await.unwrap();
    assert_eq!(relations.len(), 2);

    let notes = relations.iter().find(|r| r.source_table == "notes").unwrap();
    assert_eq!(notes.target_table, "customers");
    assert_eq!(notes.target_column, "id");

    let orders = relations.iter().find(|r| r.source_table == "orders").unwrap();
    assert_eq!(orders.source_column, "customer_id");
}

#[tokio::test]
async fn joined_rows_pair_each_order_with_its_customer() {
    let source = shop().await;
    let plan = JoinPlanner::new(&source)
        .plan(&columns(&[("orders", "total"), ("customers", "name")]), None, 100)
        .await
        .unwrap();

    let pages: Vec<_> = PageScanner::new(&source, &plan)
        .scan()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(pages.len(), 1);

    let rows = &pages[0].rows;
    assert_eq!(rows.len(), 3);
    for row in rows {
        let expected = match row.get("orders", "id").unwrap() {
            v if v == &json!(11) => "Grace",
            _ => "Ada",
        };
        assert_eq!(row.get("customers", "name"), Some(&json!(expected)));
    }
    assert_eq!(rows[0].get("orders", "total"), Some(&json!(99.5)));
}

#[tokio::test]
async fn scanning_visits_every_row_once_across_pages() {
    let source = shop().await;
    for id in 3..=7 {
        sqlx::query("INSERT INTO customers VALUES (?, ?)")
            .bind(id)
            .bind(format!("customer {id}"))
            .execute(source.pool())
            .await
            .unwrap();
    }
    let plan = JoinPlanner::new(&source)
        .plan(&columns(&[("customers", "name")]), None, 2)
        .await
        .unwrap();

    let scanner = PageScanner::new(&source, &plan);
    let rows: Vec<_> = scanner.rows().collect::<Vec<_>>().await;
    let ids: Vec<_> = rows
        .into_iter()
        .map(|r| r.unwrap().get("customers", "id").cloned().unwrap())
        .collect();
    assert_eq!(ids, (1..=7).map(|i| json!(i)).collect::<Vec<_>>());

    let page_count = scanner.scan().count().await;
    assert_eq!(page_count, 4);
}

#[tokio::test]
async fn exact_multiple_costs_one_empty_page() {
    let source = shop().await;
    let plan = JoinPlanner::new(&source)
        .plan(&columns(&[("customers", "name")]), None, 2)
        .await
        .unwrap();
    let pages: Vec<_> = PageScanner::new(&source, &plan).scan().collect().await;
    assert_eq!(pages.len(), 2);
    assert!(pages[1].as_ref().unwrap().rows.is_empty());
}

#[tokio::test]
async fn unrelated_tables_fail_to_plan() {
    let source = shop().await;
    let err = JoinPlanner::new(&source)
        .plan(&columns(&[("orders", "total"), ("tags", "note")]), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, RowsyncError::Join(_)));
}

#[tokio::test]
async fn fetch_decodes_nulls_and_types() {
    let source = shop().await;
    sqlx::query("CREATE TABLE flags (id INTEGER PRIMARY KEY, enabled BOOLEAN, label TEXT, raw BLOB)")
        .execute(source.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO flags VALUES (1, 1, NULL, X'6869')")
        .execute(source.pool())
        .await
        .unwrap();

    let set = source
        .fetch("SELECT id, enabled, label, raw FROM flags")
        .await
        .unwrap();
    assert_eq!(set.columns, vec!["id", "enabled", "label", "raw"]);
    assert_eq!(set.rows[0], vec![json!(1), json!(true), json!(null), json!("hi")]);
}

#[tokio::test]
async fn read_only_query_rejects_writes() {
    let source = shop().await;
    let err = read_only_query(&source, "DELETE FROM orders").await.unwrap_err();
    assert!(matches!(err, RowsyncError::Validation(_)));

    let set = read_only_query(&source, "  select name FROM customers ORDER BY id")
        .await
        .unwrap();
    assert_eq!(set.rows[0][0], json!("Ada"));
}

#[tokio::test]
async fn read_only_query_rejects_stacked_statements() {
    let source = shop().await;
    let err = read_only_query(&source, "SELECT 1; DELETE FROM orders")
        .await
        .unwrap_err();
    assert!(matches!(err, RowsyncError::Validation(_)));

    let set = read_only_query(&source, "SELECT count(*) AS n FROM orders;")
        .await
        .unwrap();
    assert_eq!(set.rows[0][0], json!(3));
}
