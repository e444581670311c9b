//! Lending desk service
//!
//! Loads the catalog snapshot and serves lending requests until interrupted.

use anyhow::Context;
use std::sync::Arc;

use lending_desk::{
    config::AppConfig,
    repository::{CatalogStore, JsonFileStorage},
    services::LendingService,
    transport::Server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let _log_guard = lending_desk::logging::init(&config.logging, std::io::stdout());

    tracing::info!("Starting lending desk v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = serve(config).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let storage = Arc::new(JsonFileStorage::new(&config.catalog.path));
    let catalog = CatalogStore::open(storage.clone())
        .await
        .with_context(|| format!("Failed to load catalog from {}", storage.path().display()))?;

    let service = Arc::new(LendingService::new(Arc::new(catalog), config.loans.clone()));

    let books = service.catalog().snapshot().await;
    let loaned = books.iter().filter(|book| book.is_loaned()).count();
    tracing::info!(
        "Catalog loaded from {}: {} books, {} on loan",
        storage.path().display(),
        books.len(),
        loaned
    );

    let server = Server::bind(
        &config.server.bind_address(),
        service,
        config.server.max_request_bytes,
    )
    .await
    .context("Failed to bind service endpoint")?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
