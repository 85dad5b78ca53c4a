//! Upload, download, delete and health-check workflows
//!
//! Writes follow a stage-then-commit discipline: chunk bytes are staged on
//! storage nodes first, and catalog records are written only once every
//! store succeeded. A failed or cancelled upload aborts by deleting the
//! chunks it staged. Whatever cleanup misses is left to
//! [`crate::ops::gc::collect_garbage`].

use super::chunker::{partition, reassemble};
use super::node_client::{HttpStorageNode, NodeHealth, StorageNode};
use super::placement::{self, PlacementPolicy};
use super::registry::{NodeRegistry, STATUS_HEALTHY, STATUS_UNREACHABLE};
use crate::catalog::{found, Catalog, RemoteCatalog, RocksCatalog};
use crate::common::{
    blake3_hash, generate_chunk_id, validate_file_name, CatalogLocation, CoordinatorConfig,
    CoordinatorMetrics, Error, Result,
};
use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Tunables for the workflows
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Used when an upload does not name its own chunk size
    pub chunk_size: usize,
    /// Chunk transfers in flight per workflow
    pub concurrency: usize,
    pub node_timeout: Duration,
    pub health_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from(&CoordinatorConfig::default())
    }
}

impl From<&CoordinatorConfig> for WorkflowSettings {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            concurrency: config.upload_concurrency.max(1),
            node_timeout: config.node_timeout(),
            health_timeout: config.health_timeout(),
        }
    }
}

/// Outcome of a committed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub file_name: String,
    pub size: u64,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteStatus {
    Success,
    Partial,
}

/// Outcome of a delete. The file record is gone in both cases;
/// `failed_chunks` lists chunks whose bytes could not be removed everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub file_name: String,
    pub status: DeleteStatus,
    pub chunks_total: usize,
    pub failed_chunks: Vec<String>,
}

impl DeleteReport {
    pub fn message(&self) -> String {
        match self.status {
            DeleteStatus::Success => format!("File {} deleted.", self.file_name),
            DeleteStatus::Partial => format!(
                "File {} deleted; {} of {} chunk deletes failed.",
                self.file_name,
                self.failed_chunks.len(),
                self.chunks_total
            ),
        }
    }
}

/// Per-node result of a health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthReport {
    Healthy(NodeHealth),
    Unreachable { status: String, message: String },
}

impl HealthReport {
    fn unreachable(message: impl Into<String>) -> Self {
        HealthReport::Unreachable {
            status: STATUS_UNREACHABLE.to_string(),
            message: message.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthReport::Healthy(_))
    }
}

/// Orchestrates chunk placement and the catalog across storage nodes.
///
/// Holds no state between requests besides the node registry.
pub struct Coordinator {
    catalog: Arc<dyn Catalog>,
    registry: Arc<NodeRegistry>,
    placement: Box<dyn PlacementPolicy>,
    metrics: Arc<CoordinatorMetrics>,
    settings: WorkflowSettings,
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<NodeRegistry>,
        placement: Box<dyn PlacementPolicy>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            catalog,
            registry,
            placement,
            metrics: Arc::new(CoordinatorMetrics::new()),
            settings,
        }
    }

    /// Build the catalog binding, node clients and placement policy named in
    /// `config`, and register the configured nodes.
    pub async fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let catalog: Arc<dyn Catalog> = match &config.catalog {
            CatalogLocation::Local { db_path } => Arc::new(RocksCatalog::open(db_path)?),
            CatalogLocation::Remote { url } => {
                Arc::new(RemoteCatalog::new(url.clone(), config.node_timeout())?)
            }
        };

        let coordinator = Self::new(
            catalog,
            Arc::new(NodeRegistry::new()),
            placement::from_kind(config.placement),
            WorkflowSettings::from(config),
        );
        for endpoint in &config.nodes {
            let node = HttpStorageNode::new(&endpoint.id, &endpoint.url, config.node_timeout())?;
            coordinator.register_node(Arc::new(node)).await?;
        }
        Ok(coordinator)
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<CoordinatorMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn placement_name(&self) -> &'static str {
        self.placement.name()
    }

    /// Add a node to the registry and record it in the catalog. An existing
    /// server record is kept.
    pub async fn register_node(&self, node: Arc<dyn StorageNode>) -> Result<()> {
        let id = node.id().to_string();
        let address = node.address().to_string();
        if self.registry.register(node)? {
            tracing::info!(node = %id, "Replaced registered storage node");
        }
        match self
            .catalog
            .put_server(&id, &address, STATUS_HEALTHY, 0)
            .await
        {
            Ok(()) => {
                tracing::info!(node = %id, address = %address, "Registered storage node");
                Ok(())
            }
            Err(Error::AlreadyExists(_)) => {
                tracing::info!(node = %id, "Storage node already in catalog, keeping record");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Upload `data` under `name`. `chunk_size` falls back to the configured
    /// default.
    pub async fn upload(
        &self,
        name: &str,
        data: Bytes,
        chunk_size: Option<usize>,
    ) -> Result<UploadReceipt> {
        self.upload_cancellable(name, data, chunk_size, &CancellationToken::new())
            .await
    }

    /// Upload that stops staging chunks when `cancel` fires. Chunks staged
    /// so far are deleted and `Error::Cancelled` is returned.
    pub async fn upload_cancellable(
        &self,
        name: &str,
        data: Bytes,
        chunk_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt> {
        let result = self.run_upload(name, data, chunk_size, cancel).await;
        match &result {
            Ok(receipt) => {
                self.metrics.uploads_ok.inc();
                self.metrics.bytes_uploaded.add(receipt.size);
                tracing::info!(
                    file = %name,
                    size = receipt.size,
                    chunks = receipt.chunk_ids.len(),
                    "Upload committed"
                );
            }
            Err(e) => {
                self.metrics.uploads_failed.inc();
                tracing::warn!(file = %name, "Upload failed: {}", e);
            }
        }
        result
    }

    async fn run_upload(
        &self,
        name: &str,
        data: Bytes,
        chunk_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt> {
        validate_file_name(name)?;
        let chunk_size = chunk_size.unwrap_or(self.settings.chunk_size);
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk_size must be > 0".into()));
        }
        if found(self.catalog.get_file(name).await)?.is_some() {
            return Err(Error::AlreadyExists(format!("File {}", name)));
        }

        let chunks = partition(&data, chunk_size)?;
        let chunk_ids = self.allocate_chunk_ids(chunks.len()).await?;
        let targets = if chunks.is_empty() {
            Vec::new()
        } else {
            let candidates = self.registry.healthy()?;
            placement::plan(self.placement.as_ref(), &candidates, &chunk_ids)?
        };

        // Stage
        let launched = AtomicUsize::new(0);
        let staged = self
            .stage_chunks(&chunks, &chunk_ids, &targets, &launched, cancel, name)
            .await;
        if let Err(e) = staged {
            let n = launched.load(Ordering::SeqCst);
            self.abort_staged(&chunk_ids[..n], &targets[..n]).await;
            return Err(e);
        }

        // Commit chunk records, then the file record
        for (i, (chunk_id, chunk)) in chunk_ids.iter().zip(&chunks).enumerate() {
            let replicas = [targets[i].clone()];
            let checksum = blake3_hash(chunk);
            if let Err(e) = self
                .catalog
                .put_chunk(chunk_id, &replicas, chunk.len() as u64, &checksum)
                .await
            {
                self.abort_committed(&chunk_ids[..i]).await;
                self.abort_staged(&chunk_ids, &targets).await;
                return Err(e);
            }
        }

        if let Err(e) = self
            .catalog
            .put_file(name, &chunk_ids, data.len() as u64)
            .await
        {
            // Lost a race with a concurrent upload of the same name
            self.abort_committed(&chunk_ids).await;
            self.abort_staged(&chunk_ids, &targets).await;
            return Err(e);
        }

        Ok(UploadReceipt {
            file_name: name.to_string(),
            size: data.len() as u64,
            chunk_ids,
        })
    }

    /// Fresh random chunk ids, none of which is already in the catalog.
    async fn allocate_chunk_ids(&self, count: usize) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        while ids.len() < count {
            let id = generate_chunk_id();
            if seen.contains(&id) || found(self.catalog.get_chunk(&id).await)?.is_some() {
                tracing::warn!(chunk_id = %id, "Chunk id collision, regenerating");
                continue;
            }
            seen.insert(id.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    /// Store every chunk on its planned node with bounded concurrency.
    /// `launched` ends up as one past the highest chunk index whose store
    /// was started.
    async fn stage_chunks(
        &self,
        chunks: &[Bytes],
        chunk_ids: &[String],
        targets: &[String],
        launched: &AtomicUsize,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<()> {
        let jobs = chunks
            .iter()
            .zip(chunk_ids)
            .zip(targets)
            .enumerate()
            .map(|(index, ((chunk, chunk_id), node_id))| async move {
                launched.fetch_max(index + 1, Ordering::SeqCst);
                self.store_one(chunk_id, node_id, chunk.clone()).await
            });
        let all = stream::iter(jobs)
            .boxed()
            .buffered(self.settings.concurrency)
            .try_collect::<Vec<()>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(format!("upload of {}", name))),
            result = all => result.map(|_| ()),
        }
    }

    async fn store_one(&self, chunk_id: &str, node_id: &str, data: Bytes) -> Result<()> {
        let node = self.node(node_id)?;
        let size = data.len();
        let start = Instant::now();
        let result = self
            .with_timeout(node_id, node.store_chunk(chunk_id, data))
            .await;
        self.metrics.chunk_latency.observe_duration(start.elapsed());
        match &result {
            Ok(()) => {
                self.metrics.chunks_stored.inc();
                tracing::debug!(chunk_id = %chunk_id, node = %node_id, size, "Chunk staged");
            }
            Err(e) => {
                self.metrics.chunk_failures.inc();
                tracing::warn!(chunk_id = %chunk_id, node = %node_id, "Chunk store failed: {}", e);
            }
        }
        result
    }

    /// Best-effort removal of staged chunk bytes.
    async fn abort_staged(&self, chunk_ids: &[String], targets: &[String]) {
        let deletes = chunk_ids.iter().zip(targets).map(|(chunk_id, node_id)| async move {
            let result = match self.node(node_id) {
                Ok(node) => {
                    self.with_timeout(node_id, node.delete_chunk(chunk_id))
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => tracing::warn!(
                    chunk_id = %chunk_id,
                    node = %node_id,
                    "Cleanup of staged chunk failed, left for gc: {}",
                    e
                ),
            }
        });
        stream::iter(deletes)
            .boxed()
            .buffer_unordered(self.settings.concurrency)
            .collect::<Vec<()>>()
            .await;
    }

    async fn abort_committed(&self, chunk_ids: &[String]) {
        for chunk_id in chunk_ids {
            if let Err(e) = self.catalog.delete_chunk(chunk_id).await {
                tracing::warn!(chunk_id = %chunk_id, "Cleanup of chunk record failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    /// Reassemble a stored file. Every chunk is checked against its record.
    pub async fn download(&self, name: &str) -> Result<Bytes> {
        let result = self.run_download(name).await;
        match &result {
            Ok(data) => {
                self.metrics.downloads_ok.inc();
                self.metrics.bytes_downloaded.add(data.len() as u64);
                tracing::info!(file = %name, size = data.len(), "Download complete");
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => {
                self.metrics.downloads_failed.inc();
                tracing::warn!(file = %name, "Download failed: {}", e);
            }
        }
        result
    }

    async fn run_download(&self, name: &str) -> Result<Bytes> {
        let file = self.catalog.get_file(name).await?;

        let chunks: Vec<Bytes> = stream::iter(file.chunk_ids.iter().map(|id| self.fetch_verified(id)))
            .boxed()
            .buffered(self.settings.concurrency)
            .try_collect()
            .await?;

        let data = reassemble(chunks, file.size as usize);
        if data.len() as u64 != file.size {
            return Err(Error::IntegrityViolation(format!(
                "file {} reassembled to {} bytes, recorded size is {}",
                name,
                data.len(),
                file.size
            )));
        }
        Ok(data)
    }

    /// Fetch one chunk, trying each recorded replica in order until one
    /// returns bytes matching the record.
    async fn fetch_verified(&self, chunk_id: &str) -> Result<Bytes> {
        let record = match self.catalog.get_chunk(chunk_id).await {
            Ok(record) => record,
            Err(Error::NotFound(_)) => {
                return Err(Error::IntegrityViolation(format!(
                    "chunk {} has no chunk record",
                    chunk_id
                )))
            }
            Err(e) => return Err(e),
        };

        let mut last_error = Error::IntegrityViolation(format!(
            "chunk {} has no replica locations",
            chunk_id
        ));
        for node_id in &record.replica_locations {
            let attempt = async {
                let node = self.node(node_id)?;
                let start = Instant::now();
                let data = self
                    .with_timeout(node_id, node.fetch_chunk(chunk_id))
                    .await?;
                self.metrics.chunk_latency.observe_duration(start.elapsed());
                verify_chunk(chunk_id, &data, record.size, &record.checksum)?;
                Ok::<_, Error>(data)
            };
            match attempt.await {
                Ok(data) => {
                    self.metrics.chunks_fetched.inc();
                    return Ok(data);
                }
                Err(e) => {
                    self.metrics.chunk_failures.inc();
                    tracing::warn!(chunk_id = %chunk_id, node = %node_id, "Chunk fetch failed: {}", e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove a file. The file record goes first, so the file disappears
    /// for readers even if some chunk deletes fail. Chunk records are kept
    /// for chunks that could not be removed from every replica, so garbage
    /// collection can retry them.
    pub async fn delete(&self, name: &str) -> Result<DeleteReport> {
        let file = self.catalog.get_file(name).await?;
        self.catalog.delete_file(name).await?;

        let failed: Vec<String> = stream::iter(file.chunk_ids.iter().map(|id| async move {
            match self.delete_chunk_everywhere(id).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(file = %name, chunk_id = %id, "Chunk delete failed: {}", e);
                    Some(id.clone())
                }
            }
        }))
        .boxed()
        .buffered(self.settings.concurrency)
        .filter_map(|failed| async move { failed })
        .collect()
        .await;

        let status = if failed.is_empty() {
            self.metrics.deletes_ok.inc();
            DeleteStatus::Success
        } else {
            self.metrics.deletes_partial.inc();
            DeleteStatus::Partial
        };
        let report = DeleteReport {
            file_name: name.to_string(),
            status,
            chunks_total: file.chunk_ids.len(),
            failed_chunks: failed,
        };
        tracing::info!(file = %name, "{}", report.message());
        Ok(report)
    }

    async fn delete_chunk_everywhere(&self, chunk_id: &str) -> Result<()> {
        let record = match self.catalog.get_chunk(chunk_id).await {
            Ok(record) => record,
            Err(Error::NotFound(_)) => {
                return Err(Error::IntegrityViolation(format!(
                    "chunk {} has no chunk record",
                    chunk_id
                )))
            }
            Err(e) => return Err(e),
        };

        let mut failures = 0;
        for node_id in &record.replica_locations {
            let result = match self.node(node_id) {
                Ok(node) => {
                    self.with_timeout(node_id, node.delete_chunk(chunk_id))
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => self.metrics.chunks_deleted.inc(),
                Err(Error::NotFound(_)) => {}
                Err(e) => {
                    self.metrics.chunk_failures.inc();
                    tracing::warn!(chunk_id = %chunk_id, node = %node_id, "Replica delete failed: {}", e);
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            return Err(Error::PartialFailure {
                failed: failures,
                total: record.replica_locations.len(),
            });
        }
        self.catalog.delete_chunk(chunk_id).await
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Probe every registered node concurrently, each bounded by the health
    /// timeout. Per-node failures are reported, never returned as errors.
    pub async fn health_check(&self) -> BTreeMap<String, HealthReport> {
        let nodes = match self.registry.nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::error!("Health check could not read node registry: {}", e);
                return BTreeMap::new();
            }
        };

        let timeout = self.settings.health_timeout;
        let probes = nodes.into_iter().map(|node| async move {
            let report = match tokio::time::timeout(timeout, node.node_health()).await {
                Ok(Ok(health)) => HealthReport::Healthy(health),
                Ok(Err(e)) => HealthReport::unreachable(e.to_string()),
                Err(_) => HealthReport::unreachable(format!(
                    "no health report within {}ms",
                    timeout.as_millis()
                )),
            };
            (node, report)
        });
        let results = join_all(probes).await;

        let mut reports = BTreeMap::new();
        let mut unreachable = 0;
        for (node, report) in results {
            let id = node.id().to_string();
            let (marked, status, load) = match &report {
                HealthReport::Healthy(health) => (
                    self.registry.mark_healthy(&id, health.chunk_count),
                    STATUS_HEALTHY,
                    health.chunk_count,
                ),
                HealthReport::Unreachable { message, .. } => {
                    tracing::warn!(node = %id, "Storage node unreachable: {}", message);
                    unreachable += 1;
                    (self.registry.mark_unreachable(&id), STATUS_UNREACHABLE, 0)
                }
            };
            // A node removed while its probe was in flight keeps no server record
            match marked {
                Ok(()) => {
                    self.record_server_status(&id, node.address(), status, load)
                        .await
                }
                Err(e) => tracing::warn!(node = %id, "Could not record node health: {}", e),
            }
            reports.insert(id, report);
        }

        self.metrics.health_checks.inc();
        self.metrics.unreachable_nodes.set(unreachable);
        reports
    }

    async fn record_server_status(&self, id: &str, address: &str, status: &str, load: u64) {
        let result = match self.catalog.update_server(id, status, load).await {
            Err(Error::NotFound(_)) => match self.catalog.put_server(id, address, status, load).await {
                Err(Error::AlreadyExists(_)) => self.catalog.update_server(id, status, load).await,
                other => other,
            },
            other => other,
        };
        if let Err(e) = result {
            tracing::warn!(node = %id, "Could not record server status: {}", e);
        }
    }

    // ------------------------------------------------------------------

    fn node(&self, node_id: &str) -> Result<Arc<dyn StorageNode>> {
        self.registry
            .get(node_id)?
            .ok_or_else(|| Error::NotFound(format!("Node {} is not registered", node_id)))
    }

    async fn with_timeout<T>(
        &self,
        node_id: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.settings.node_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::NodeUnreachable {
                node: node_id.to_string(),
                reason: format!("no response within {}ms", self.settings.node_timeout.as_millis()),
            }),
        }
    }
}

/// Check fetched bytes against the chunk record. An empty recorded checksum
/// skips the digest comparison.
fn verify_chunk(chunk_id: &str, data: &[u8], size: u64, checksum: &str) -> Result<()> {
    if data.len() as u64 != size {
        return Err(Error::IntegrityViolation(format!(
            "chunk {} is {} bytes, recorded size is {}",
            chunk_id,
            data.len(),
            size
        )));
    }
    if !checksum.is_empty() && blake3_hash(data) != checksum {
        return Err(Error::IntegrityViolation(format!(
            "chunk {} checksum mismatch",
            chunk_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::coordinator::placement::RoundRobin;
    use crate::node::MemoryNode;

    fn coordinator(nodes: &[Arc<MemoryNode>]) -> (Coordinator, Arc<MemoryCatalog>) {
        let catalog = Arc::new(MemoryCatalog::new());
        let registry = NodeRegistry::with_nodes(
            nodes.iter().map(|n| n.clone() as Arc<dyn StorageNode>),
        )
        .unwrap();
        let settings = WorkflowSettings {
            chunk_size: 4,
            concurrency: 2,
            node_timeout: Duration::from_secs(2),
            health_timeout: Duration::from_millis(200),
        };
        (
            Coordinator::new(
                catalog.clone(),
                Arc::new(registry),
                Box::new(RoundRobin),
                settings,
            ),
            catalog,
        )
    }

    fn memory_nodes(n: usize) -> Vec<Arc<MemoryNode>> {
        (1..=n)
            .map(|i| Arc::new(MemoryNode::new(format!("node-{}", i), 1 << 20)))
            .collect()
    }

    #[tokio::test]
    async fn test_upload_records_chunks_in_order() {
        let nodes = memory_nodes(2);
        let (coord, catalog) = coordinator(&nodes);

        let receipt = coord
            .upload("a.txt", Bytes::from_static(b"0123456789"), None)
            .await
            .unwrap();
        assert_eq!(receipt.chunk_ids.len(), 3);

        let file = catalog.get_file("a.txt").await.unwrap();
        assert_eq!(file.chunk_ids, receipt.chunk_ids);
        assert_eq!(file.size, 10);

        let sizes: Vec<u64> = {
            let mut sizes = Vec::new();
            for id in &file.chunk_ids {
                sizes.push(catalog.get_chunk(id).await.unwrap().size);
            }
            sizes
        };
        assert_eq!(sizes, vec![4, 4, 2]);

        // Round robin over two nodes
        let first = catalog.get_chunk(&file.chunk_ids[0]).await.unwrap();
        let second = catalog.get_chunk(&file.chunk_ids[1]).await.unwrap();
        assert_ne!(first.replica_locations, second.replica_locations);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let (coord, catalog) = coordinator(&memory_nodes(1));
        let receipt = coord.upload("empty", Bytes::new(), None).await.unwrap();
        assert!(receipt.chunk_ids.is_empty());
        assert_eq!(catalog.get_file("empty").await.unwrap().size, 0);
        assert!(coord.download("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_nodes_fails_fast() {
        let (coord, catalog) = coordinator(&[]);
        let err = coord
            .upload("a", Bytes::from_static(b"data"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoAvailableNode));
        assert!(catalog.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let (coord, _) = coordinator(&memory_nodes(1));
        assert!(matches!(
            coord.upload("a", Bytes::from_static(b"x"), Some(0)).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_dot_segment_names_rejected() {
        let nodes = memory_nodes(1);
        let (coord, catalog) = coordinator(&nodes);
        for name in [".", ".."] {
            assert!(matches!(
                coord.upload(name, Bytes::from_static(b"data"), None).await,
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                coord.download(name).await,
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                coord.delete(name).await,
                Err(Error::InvalidArgument(_))
            ));
        }
        assert!(nodes[0].chunk_ids().is_empty());
        assert!(catalog.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_upload_cleans_up() {
        let nodes = memory_nodes(1);
        let (coord, catalog) = coordinator(&nodes);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coord
            .upload_cancellable("a", Bytes::from(vec![1u8; 64]), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(nodes[0].chunk_ids().is_empty());
        assert!(catalog.list_chunks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_detects_corruption() {
        let nodes = memory_nodes(1);
        let (coord, catalog) = coordinator(&nodes);
        coord
            .upload("a", Bytes::from_static(b"abcdefgh"), None)
            .await
            .unwrap();
        let file = catalog.get_file("a").await.unwrap();
        nodes[0]
            .corrupt(&file.chunk_ids[1], Bytes::from_static(b"EFGH"))
            .unwrap();

        assert!(matches!(
            coord.download("a").await,
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_chunk_record_is_integrity_violation() {
        let nodes = memory_nodes(1);
        let (coord, catalog) = coordinator(&nodes);
        coord
            .upload("a", Bytes::from_static(b"abcdefgh"), None)
            .await
            .unwrap();
        let file = catalog.get_file("a").await.unwrap();
        catalog.delete_chunk(&file.chunk_ids[0]).await.unwrap();

        assert!(matches!(
            coord.download("a").await,
            Err(Error::IntegrityViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_download_fails_over_to_next_replica() {
        let nodes = memory_nodes(2);
        let (coord, catalog) = coordinator(&nodes);

        let data = Bytes::from_static(b"abcd");
        nodes[1].store_chunk("c0", data.clone()).await.unwrap();
        catalog
            .put_chunk(
                "c0",
                &["node-1".to_string(), "node-2".to_string()],
                4,
                &blake3_hash(&data),
            )
            .await
            .unwrap();
        catalog.put_file("f", &["c0".to_string()], 4).await.unwrap();

        assert_eq!(coord.download("f").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_delete_removes_records_and_bytes() {
        let nodes = memory_nodes(2);
        let (coord, catalog) = coordinator(&nodes);
        coord
            .upload("a", Bytes::from_static(b"0123456789"), None)
            .await
            .unwrap();

        let report = coord.delete("a").await.unwrap();
        assert_eq!(report.status, DeleteStatus::Success);
        assert_eq!(report.chunks_total, 3);
        assert!(catalog.list_chunks().await.unwrap().is_empty());
        assert!(nodes.iter().all(|n| n.chunk_ids().is_empty()));
        assert!(matches!(coord.delete("a").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_health_check_updates_catalog() {
        let nodes = memory_nodes(2);
        let (coord, catalog) = coordinator(&nodes);
        // Registry built directly, so the catalog has no server records yet
        let reports = coord.health_check().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.values().all(HealthReport::is_healthy));
        assert_eq!(
            catalog.get_server("node-1").await.unwrap().status,
            STATUS_HEALTHY
        );
    }

    #[tokio::test]
    async fn test_node_removed_during_health_probe() {
        let slow = Arc::new(crate::testing::FaultyNode::new(Arc::new(MemoryNode::new(
            "node-1", 1 << 20,
        ))));
        slow.set_delay(Some(Duration::from_millis(100)));
        let catalog = Arc::new(MemoryCatalog::new());
        let registry =
            Arc::new(NodeRegistry::with_nodes([slow as Arc<dyn StorageNode>]).unwrap());
        let coord = Coordinator::new(
            catalog.clone(),
            registry.clone(),
            Box::new(RoundRobin),
            WorkflowSettings {
                health_timeout: Duration::from_secs(2),
                ..WorkflowSettings::default()
            },
        );

        let (reports, removed) = tokio::join!(coord.health_check(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.remove("node-1").unwrap()
        });
        assert!(removed);
        assert!(reports["node-1"].is_healthy());
        assert!(registry.is_empty());
        assert!(matches!(
            catalog.get_server("node-1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_health_report_shape() {
        let report = HealthReport::unreachable("timed out");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unreachable");
        assert_eq!(json["message"], "timed out");
    }
}
