//! Coordinator server

use crate::common::{shutdown_signal, CatalogLocation, CoordinatorConfig, Result};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::workflow::Coordinator;
use crate::ops;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct CoordinatorServer {
    config: CoordinatorConfig,
}

impl CoordinatorServer {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting coordinator");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        match &self.config.catalog {
            CatalogLocation::Local { db_path } => {
                tracing::info!("  Catalog: local ({})", db_path.display())
            }
            CatalogLocation::Remote { url } => tracing::info!("  Catalog: remote ({})", url),
        }
        tracing::info!("  Storage nodes: {}", self.config.nodes.len());
        tracing::info!("  Placement: {:?}", self.config.placement);

        let coordinator = Arc::new(Coordinator::from_config(&self.config).await?);
        let shutdown = CancellationToken::new();

        let health_handle = tokio::spawn(run_health_checks(
            coordinator.clone(),
            self.config.health_interval(),
            shutdown.clone(),
        ));
        let gc_handle = tokio::spawn(ops::gc::run_periodic(
            coordinator.clone(),
            self.config.gc_interval(),
            self.config.gc_grace(),
            shutdown.clone(),
        ));

        let state = CoordState {
            coordinator,
            gc_grace: self.config.gc_grace(),
        };
        let router = create_router(state, self.config.max_upload_bytes);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Coordinator ready");

        let stop = shutdown.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                stop.cancel();
            })
            .await;

        shutdown.cancel();
        let _ = tokio::join!(health_handle, gc_handle);

        if let Err(e) = result {
            tracing::error!("HTTP server error: {}", e);
            return Err(e.into());
        }
        tracing::info!("Coordinator stopped");
        Ok(())
    }
}

/// Refresh node health every `interval` until `cancel` fires.
async fn run_health_checks(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    cancel: CancellationToken,
) {
    if interval.is_zero() {
        return;
    }
    loop {
        let reports = coordinator.health_check().await;
        let healthy = reports.values().filter(|r| r.is_healthy()).count();
        tracing::debug!("Health check: {}/{} nodes healthy", healthy, reports.len());

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
