//! Catalog consistency check

use crate::catalog::Catalog;
use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A file whose chunk list names a chunk with no record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingChunk {
    pub file_name: String,
    pub chunk_id: String,
}

/// A chunk record naming a node the catalog does not know
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownReplica {
    pub chunk_id: String,
    pub server_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub files_checked: usize,
    pub chunks_checked: usize,
    pub missing_chunks: Vec<MissingChunk>,
    /// Chunk records no file refers to
    pub unreferenced_chunks: Vec<String>,
    pub unknown_replicas: Vec<UnknownReplica>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_chunks.is_empty()
            && self.unreferenced_chunks.is_empty()
            && self.unknown_replicas.is_empty()
    }
}

/// Cross-check file, chunk and server records. Read-only.
pub async fn verify_catalog(catalog: &dyn Catalog) -> Result<VerifyReport> {
    tracing::info!("Starting catalog verification");

    let files = catalog.list_files().await?;
    let chunks: BTreeMap<String, _> = catalog
        .list_chunks()
        .await?
        .into_iter()
        .map(|c| (c.chunk_id.clone(), c))
        .collect();
    let servers: HashSet<String> = catalog
        .list_servers()
        .await?
        .into_iter()
        .map(|s| s.server_id)
        .collect();

    let mut report = VerifyReport {
        files_checked: files.len(),
        chunks_checked: chunks.len(),
        ..Default::default()
    };

    let mut referenced = HashSet::new();
    for file in &files {
        for chunk_id in &file.chunk_ids {
            referenced.insert(chunk_id.as_str());
            if !chunks.contains_key(chunk_id) {
                report.missing_chunks.push(MissingChunk {
                    file_name: file.name.clone(),
                    chunk_id: chunk_id.clone(),
                });
            }
        }
    }

    for (chunk_id, chunk) in &chunks {
        if !referenced.contains(chunk_id.as_str()) {
            report.unreferenced_chunks.push(chunk_id.clone());
        }
        for server_id in &chunk.replica_locations {
            if !servers.contains(server_id) {
                report.unknown_replicas.push(UnknownReplica {
                    chunk_id: chunk_id.clone(),
                    server_id: server_id.clone(),
                });
            }
        }
    }

    tracing::info!(
        "Verification done: {} files, {} chunks, {} missing, {} unreferenced, {} unknown replicas",
        report.files_checked,
        report.chunks_checked,
        report.missing_chunks.len(),
        report.unreferenced_chunks.len(),
        report.unknown_replicas.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    #[tokio::test]
    async fn test_clean_catalog() {
        let catalog = MemoryCatalog::new();
        catalog.put_server("n1", "http://n1", "healthy", 0).await.unwrap();
        catalog.put_chunk("c0", &["n1".into()], 4, "h").await.unwrap();
        catalog.put_file("f", &["c0".into()], 4).await.unwrap();

        let report = verify_catalog(&catalog).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files_checked, 1);
    }

    #[tokio::test]
    async fn test_reports_every_inconsistency() {
        let catalog = MemoryCatalog::new();
        catalog.put_chunk("stray", &["ghost".into()], 4, "h").await.unwrap();
        catalog.put_file("f", &["lost".into()], 4).await.unwrap();

        let report = verify_catalog(&catalog).await.unwrap();
        assert_eq!(
            report.missing_chunks,
            vec![MissingChunk {
                file_name: "f".into(),
                chunk_id: "lost".into()
            }]
        );
        assert_eq!(report.unreferenced_chunks, vec!["stray"]);
        assert_eq!(report.unknown_replicas[0].server_id, "ghost");
        assert!(!report.is_clean());
    }
}
