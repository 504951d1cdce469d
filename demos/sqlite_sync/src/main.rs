use std::sync::Arc;

use rowsync::callbacks::{CompositeCallback, RecordingCallback, TracingCallback};
use rowsync::core::{PayloadFilter, RowsyncError};
use rowsync::embeddings::FakeEmbeddings;
use rowsync::sql::SqliteSource;
use rowsync::sync::{SyncConfig, SyncCoordinator, SyncRequest, Synchronizer};
use rowsync::vectorstores::InMemoryIndex;

async fn exec(source: &SqliteSource, sql: &str) -> Result<(), RowsyncError> {
    sqlx::query(sql)
        .execute(source.pool())
        .await
        .map_err(|e| RowsyncError::Database(e.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), RowsyncError> {
    tracing_subscriber::fmt::init();

    let source = SqliteSource::in_memory("shop").await?;
    // Prices are TEXT so they render exactly as written.
    exec(
        &source,
        "CREATE TABLE products (
            id INTEGER PRIMARY KEY,
            nom TEXT NOT NULL,
            description TEXT,
            categorie TEXT,
            prix TEXT NOT NULL,
            stock INTEGER DEFAULT 0
        )",
    )
    .await?;
    exec(
        &source,
        "INSERT INTO products (nom, description, categorie, prix, stock) VALUES
            ('Chaise', 'Chaise en bois confortable', 'Mobilier', '49.99', 10),
            ('Table', 'Table en palissandre', 'Mobilier', '149.50', 5),
            ('Lampe', 'Lampe LED écoénergétique', 'Éclairage', '25.00', 20)",
    )
    .await?;

    let index = Arc::new(InMemoryIndex::new());
    let coordinator = SyncCoordinator::new(Arc::new(FakeEmbeddings::default()), index.clone());
    let recorder = RecordingCallback::new();
    let callbacks = CompositeCallback::new(vec![
        Arc::new(recorder.clone()),
        Arc::new(TracingCallback::new()),
    ]);
    let synchronizer = Synchronizer::new(Arc::new(source), coordinator, SyncConfig::default())?
        .with_callback(Arc::new(callbacks));

    // --- Sync ---
    println!("=== Sync ===");
    let report = synchronizer
        .run(&SyncRequest::new(
            "{{.products.nom}} ({{.products.categorie}}): {{.products.description}}. \
             {{.products.prix}} EUR, {{.products.stock}} in stock",
            "owner-1",
        ))
        .await?;
    println!(
        "run {} synced {} rows from {} in {} page(s)",
        report.run_id, report.rows_processed, report.source, report.pages_fetched
    );
    println!("{} events recorded", recorder.events().await.len());

    // --- Search ---
    println!("\n=== Search ===");
    let filter = PayloadFilter::new().with_owner("owner-1");
    let coordinator = synchronizer.coordinator();
    for hit in coordinator.search("Chaise en bois", 3, Some(&filter)).await? {
        println!("  {:.3}  {}  ({})", hit.score, hit.payload.text, hit.payload.data_id);
    }

    // --- Delete ---
    println!("\n=== Delete ===");
    let id = coordinator.delete_by_id(&report.source, "owner-1", "1").await?;
    println!("deleted {id}, {} points left", index.len().await);
    coordinator.delete_by_filter("owner-1", &report.source).await?;
    println!("deleted owner-1, {} points left", index.len().await);

    Ok(())
}
