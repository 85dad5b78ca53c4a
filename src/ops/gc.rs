//! Orphan garbage collection
//!
//! Two kinds of orphan are reaped:
//! - chunk records no file refers to (left by failed deletes), together
//!   with their bytes;
//! - chunk bytes on a node with no chunk record (left by aborted uploads
//!   whose cleanup failed).
//!
//! Both only count once older than the grace period, so chunks belonging
//! to an upload still in flight are never touched.

use crate::common::{Error, Result};
use crate::coordinator::node_client::StorageNode;
use crate::coordinator::Coordinator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOrphan {
    pub node: String,
    pub chunk_id: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub dry_run: bool,
    /// Unreferenced chunk records found
    pub unreferenced_records: Vec<String>,
    /// Chunk bytes on nodes with no chunk record
    pub node_orphans: Vec<NodeOrphan>,
    pub records_removed: usize,
    pub chunks_removed: usize,
    pub bytes_reclaimed: u64,
    pub failures: usize,
    /// Nodes that could not be listed
    pub nodes_skipped: Vec<String>,
}

/// Run one collection pass.
pub async fn collect_garbage(
    coordinator: &Coordinator,
    grace: Duration,
    dry_run: bool,
) -> Result<GcReport> {
    tracing::info!("Running garbage collection (dry_run: {})", dry_run);

    let grace = chrono::Duration::from_std(grace)
        .map_err(|e| Error::InvalidArgument(format!("grace period: {}", e)))?;
    let cutoff: DateTime<Utc> = Utc::now() - grace;
    let timeout = coordinator.settings().node_timeout;
    let catalog = coordinator.catalog();

    let mut report = GcReport {
        dry_run,
        ..Default::default()
    };

    let referenced: HashSet<String> = catalog
        .list_files()
        .await?
        .into_iter()
        .flat_map(|f| f.chunk_ids)
        .collect();
    let chunks = catalog.list_chunks().await?;
    let known: HashSet<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();

    // Unreferenced chunk records
    for chunk in chunks
        .iter()
        .filter(|c| !referenced.contains(&c.chunk_id) && c.last_verified < cutoff)
    {
        report.unreferenced_records.push(chunk.chunk_id.clone());
        if dry_run {
            continue;
        }

        let mut clean = true;
        for node_id in &chunk.replica_locations {
            let Some(node) = coordinator.registry().get(node_id)? else {
                tracing::warn!(chunk_id = %chunk.chunk_id, node = %node_id, "Replica on unregistered node");
                clean = false;
                continue;
            };
            match delete_with_timeout(node.as_ref(), &chunk.chunk_id, timeout).await {
                Ok(()) => {
                    report.chunks_removed += 1;
                    report.bytes_reclaimed += chunk.size;
                }
                Err(Error::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(chunk_id = %chunk.chunk_id, node = %node_id, "Deletion failed: {}", e);
                    clean = false;
                }
            }
        }

        if !clean {
            report.failures += 1;
            continue;
        }
        match catalog.delete_chunk(&chunk.chunk_id).await {
            Ok(()) => report.records_removed += 1,
            Err(e) => {
                tracing::warn!(chunk_id = %chunk.chunk_id, "Chunk record removal failed: {}", e);
                report.failures += 1;
            }
        }
    }

    // Bytes on nodes that the catalog does not know about
    for node in coordinator.registry().nodes()? {
        let listing = match tokio::time::timeout(timeout, node.list_chunks()).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                tracing::warn!(node = %node.id(), "Could not list chunks: {}", e);
                report.nodes_skipped.push(node.id().to_string());
                continue;
            }
            Err(_) => {
                tracing::warn!(node = %node.id(), "Chunk listing timed out");
                report.nodes_skipped.push(node.id().to_string());
                continue;
            }
        };

        for stored in listing
            .into_iter()
            .filter(|s| !known.contains(&s.chunk_id) && s.stored_at < cutoff)
        {
            report.node_orphans.push(NodeOrphan {
                node: node.id().to_string(),
                chunk_id: stored.chunk_id.clone(),
                size: stored.size,
            });
            if dry_run {
                continue;
            }
            match delete_with_timeout(node.as_ref(), &stored.chunk_id, timeout).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    report.chunks_removed += 1;
                    report.bytes_reclaimed += stored.size;
                }
                Err(e) => {
                    tracing::warn!(node = %node.id(), chunk_id = %stored.chunk_id, "Deletion failed: {}", e);
                    report.failures += 1;
                }
            }
        }
    }

    tracing::info!(
        "Garbage collection done: {} unreferenced records, {} node orphans, {} chunks removed, {} failures",
        report.unreferenced_records.len(),
        report.node_orphans.len(),
        report.chunks_removed,
        report.failures
    );
    Ok(report)
}

/// Runs collection every `interval` until `cancel` fires. Errors are logged
/// and the loop keeps going.
pub async fn run_periodic(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    grace: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    if interval.is_zero() {
        return;
    }
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = collect_garbage(&coordinator, grace, false).await {
            tracing::warn!("Garbage collection failed: {}", e);
        }
    }
}

async fn delete_with_timeout(node: &dyn StorageNode, chunk_id: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, node.delete_chunk(chunk_id)).await {
        Ok(result) => result,
        Err(_) => Err(Error::NodeUnreachable {
            node: node.id().to_string(),
            reason: "delete timed out".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, MemoryCatalog};
    use crate::coordinator::placement::RoundRobin;
    use crate::coordinator::{NodeRegistry, WorkflowSettings};
    use crate::node::MemoryNode;
    use bytes::Bytes;

    fn setup() -> (Coordinator, Arc<MemoryNode>, Arc<MemoryCatalog>) {
        let node = Arc::new(MemoryNode::new("n1", 1 << 20));
        let catalog = Arc::new(MemoryCatalog::new());
        let registry =
            NodeRegistry::with_nodes([node.clone() as Arc<dyn StorageNode>]).unwrap();
        let coord = Coordinator::new(
            catalog.clone(),
            Arc::new(registry),
            Box::new(RoundRobin),
            WorkflowSettings {
                chunk_size: 4,
                ..Default::default()
            },
        );
        (coord, node, catalog)
    }

    #[tokio::test]
    async fn test_reaps_old_node_orphans_only() {
        let (coord, node, _) = setup();
        let old = Utc::now() - chrono::Duration::hours(2);
        node.insert_at("old-orphan", Bytes::from_static(b"xx"), old).unwrap();
        node.insert_at("fresh", Bytes::from_static(b"yy"), Utc::now()).unwrap();

        let report = collect_garbage(&coord, Duration::from_secs(3600), true)
            .await
            .unwrap();
        assert_eq!(report.node_orphans.len(), 1);
        assert!(node.contains("old-orphan"));

        let report = collect_garbage(&coord, Duration::from_secs(3600), false)
            .await
            .unwrap();
        assert_eq!(report.chunks_removed, 1);
        assert_eq!(report.bytes_reclaimed, 2);
        assert!(!node.contains("old-orphan"));
        assert!(node.contains("fresh"));
    }

    #[tokio::test]
    async fn test_keeps_referenced_chunks() {
        let (coord, node, _) = setup();
        coord
            .upload("f", Bytes::from_static(b"abcdefgh"), None)
            .await
            .unwrap();

        let report = collect_garbage(&coord, Duration::ZERO, false).await.unwrap();
        assert!(report.unreferenced_records.is_empty());
        assert!(report.node_orphans.is_empty());
        assert_eq!(node.chunk_ids().len(), 2);
        assert_eq!(coord.download("f").await.unwrap(), Bytes::from_static(b"abcdefgh"));
    }

    #[tokio::test]
    async fn test_removes_unreferenced_records_and_bytes() {
        let (coord, node, catalog) = setup();
        node.store_chunk("c-left", Bytes::from_static(b"abcd")).await.unwrap();
        catalog
            .put_chunk("c-left", &["n1".to_string()], 4, "")
            .await
            .unwrap();

        let report = collect_garbage(&coord, Duration::ZERO, false).await.unwrap();
        assert_eq!(report.unreferenced_records, vec!["c-left"]);
        assert_eq!(report.records_removed, 1);
        assert!(!node.contains("c-left"));
        assert!(catalog.list_chunks().await.unwrap().is_empty());
    }
}
