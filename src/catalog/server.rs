//! Standalone catalog server

use super::rocks::RocksCatalog;
use super::service::create_router;
use crate::common::{shutdown_signal, CatalogConfig, Result};
use std::sync::Arc;

pub struct CatalogServer {
    config: CatalogConfig,
}

impl CatalogServer {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting catalog service");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  DB path: {}", self.config.db_path.display());

        let catalog = Arc::new(RocksCatalog::open(&self.config.db_path)?);
        let router = create_router(catalog.clone(), self.config.max_body_bytes);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Catalog service ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        catalog.flush()?;
        tracing::info!("Catalog service stopped");
        Ok(())
    }
}
