use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warehouse_core::core::config::Config;
use warehouse_core::core::database;
use warehouse_core::features::categories::CategoryService;
use warehouse_core::modules::persistence::PgDatastore;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        "Configuration loaded: tokio_worker_threads={}, category_max_depth={}, repair_on_startup={}",
        worker_threads,
        config.categories.max_depth,
        config.categories.repair_on_startup
    );

    // Create database connection pool
    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    // Run migrations automatically
    tracing::info!("Running database migrations...");
    database::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed successfully");

    let category_service = CategoryService::new(PgDatastore::new(pool), &config.categories);

    // Audit materialized paths
    let drift = category_service
        .verify_paths()
        .await
        .map_err(|e| anyhow::anyhow!("Category path audit failed: {}", e))?;
    for entry in &drift {
        tracing::warn!(
            "Category {} path drift: stored={}, expected={}",
            entry.id,
            entry.stored,
            entry.expected
        );
    }
    tracing::info!("Category path audit found {} drifted categories", drift.len());

    if !drift.is_empty() && config.categories.repair_on_startup {
        category_service
            .repair_paths()
            .await
            .map_err(|e| anyhow::anyhow!("Category path repair failed: {}", e))?;
    }

    Ok(())
}
