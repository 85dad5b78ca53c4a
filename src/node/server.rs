//! Storage node server

use super::http::{create_router, NodeState};
use super::store::ChunkStore;
use crate::common::{format_bytes, shutdown_signal, NodeConfig, Result};
use std::sync::Arc;
use std::time::Instant;

pub struct NodeServer {
    config: NodeConfig,
}

impl NodeServer {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;

        tracing::info!("Starting storage node: {}", self.config.id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Data dir: {}", self.config.data_dir.display());
        tracing::info!("  Capacity: {}", format_bytes(self.config.capacity_bytes));

        let store = ChunkStore::open(
            &self.config.data_dir,
            self.config.capacity_bytes,
            self.config.max_chunk_bytes,
        )
        .await?;

        let state = NodeState {
            node_id: self.config.id.clone(),
            store: Arc::new(store),
            started: Instant::now(),
        };
        let router = create_router(state, self.config.max_chunk_bytes);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Storage node ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Storage node stopped");
        Ok(())
    }
}
