//! Metadata catalog
//!
//! Authoritative record of files, chunks and storage nodes. The catalog
//! only does point reads, inserts and deletes by primary key; sequencing
//! multi-record changes is the coordinator's job.
//!
//! Bindings:
//! - [`RocksCatalog`]: durable, in-process (RocksDB)
//! - [`MemoryCatalog`]: ephemeral, in-process
//! - [`RemoteCatalog`]: HTTP client for the standalone catalog service
//!
//! All three return the same records with the same `NotFound` /
//! `AlreadyExists` semantics.

pub mod memory;
pub mod remote;
pub mod rocks;
pub mod server;
pub mod service;

pub use memory::MemoryCatalog;
pub use remote::RemoteCatalog;
pub use rocks::RocksCatalog;
pub use server::CatalogServer;

use crate::common::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored file: its ordered chunk list and total size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    /// Order matters: concatenating the chunks in this order yields the file
    pub chunk_ids: Vec<String>,
    pub size: u64,
    pub upload_time: DateTime<Utc>,
}

/// A stored chunk and the nodes holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub replica_locations: Vec<String>,
    pub size: u64,
    /// BLAKE3 hex digest of the chunk bytes
    pub checksum: String,
    pub last_verified: DateTime<Utc>,
}

/// A registered storage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub address: String,
    /// Free text, e.g. "healthy" or "unreachable"
    pub status: String,
    /// Advisory; refreshed by health checks
    pub load: u64,
}

/// Catalog operations shared by every binding.
///
/// Inserts are never upserts: an existing key yields `Error::AlreadyExists`
/// and leaves the stored record untouched. Deletes are idempotent.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn put_file(&self, name: &str, chunk_ids: &[String], size: u64) -> Result<()>;

    async fn put_chunk(
        &self,
        chunk_id: &str,
        replicas: &[String],
        size: u64,
        checksum: &str,
    ) -> Result<()>;

    async fn put_server(&self, server_id: &str, address: &str, status: &str, load: u64)
        -> Result<()>;

    /// Update status and load of an existing server record.
    async fn update_server(&self, server_id: &str, status: &str, load: u64) -> Result<()>;

    async fn get_file(&self, name: &str) -> Result<FileRecord>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRecord>;

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()>;

    async fn delete_server(&self, server_id: &str) -> Result<()>;

    async fn list_servers(&self) -> Result<Vec<ServerRecord>>;

    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>>;
}

/// `Ok(None)` for `NotFound`, other errors pass through.
pub(crate) fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(crate::Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Behavioral checks every binding must pass.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::Error;

    pub async fn file_lifecycle(catalog: &dyn Catalog) {
        let chunks = vec!["c0".to_string(), "c1".to_string(), "c2".to_string()];
        catalog.put_file("report.pdf", &chunks, 300).await.unwrap();

        let file = catalog.get_file("report.pdf").await.unwrap();
        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.chunk_ids, chunks);
        assert_eq!(file.size, 300);

        // Not an upsert
        let dup = catalog
            .put_file("report.pdf", &["other".to_string()], 1)
            .await;
        assert!(matches!(dup, Err(Error::AlreadyExists(_))));
        assert_eq!(catalog.get_file("report.pdf").await.unwrap().chunk_ids, chunks);

        catalog.delete_file("report.pdf").await.unwrap();
        assert!(matches!(
            catalog.get_file("report.pdf").await,
            Err(Error::NotFound(_))
        ));
        // Idempotent
        catalog.delete_file("report.pdf").await.unwrap();
    }

    pub async fn chunk_lifecycle(catalog: &dyn Catalog) {
        let replicas = vec!["worker1".to_string()];
        catalog
            .put_chunk("chunk-a", &replicas, 64, "abc")
            .await
            .unwrap();

        let chunk = catalog.get_chunk("chunk-a").await.unwrap();
        assert_eq!(chunk.replica_locations, replicas);
        assert_eq!(chunk.size, 64);
        assert_eq!(chunk.checksum, "abc");

        assert!(matches!(
            catalog.put_chunk("chunk-a", &[], 1, "x").await,
            Err(Error::AlreadyExists(_))
        ));

        catalog.delete_chunk("chunk-a").await.unwrap();
        catalog.delete_chunk("chunk-a").await.unwrap();
        assert!(matches!(
            catalog.get_chunk("chunk-a").await,
            Err(Error::NotFound(_))
        ));
    }

    pub async fn server_lifecycle(catalog: &dyn Catalog) {
        catalog
            .put_server("worker2", "http://127.0.0.1:5004", "healthy", 3)
            .await
            .unwrap();
        catalog
            .put_server("worker1", "http://127.0.0.1:5003", "healthy", 0)
            .await
            .unwrap();
        assert!(matches!(
            catalog.put_server("worker1", "x", "healthy", 0).await,
            Err(Error::AlreadyExists(_))
        ));

        catalog.update_server("worker1", "unreachable", 7).await.unwrap();
        let server = catalog.get_server("worker1").await.unwrap();
        assert_eq!(server.status, "unreachable");
        assert_eq!(server.load, 7);
        assert_eq!(server.address, "http://127.0.0.1:5003");

        assert!(matches!(
            catalog.update_server("ghost", "healthy", 0).await,
            Err(Error::NotFound(_))
        ));

        let servers = catalog.list_servers().await.unwrap();
        let ids: Vec<_> = servers.iter().map(|s| s.server_id.as_str()).collect();
        assert_eq!(ids, vec!["worker1", "worker2"]);

        catalog.delete_server("worker1").await.unwrap();
        catalog.delete_server("worker1").await.unwrap();
        assert!(matches!(
            catalog.get_server("worker1").await,
            Err(Error::NotFound(_))
        ));
    }

    pub async fn listing(catalog: &dyn Catalog) {
        catalog.put_file("b.bin", &["b0".to_string()], 1).await.unwrap();
        catalog.put_file("a.bin", &["a0".to_string()], 1).await.unwrap();
        catalog.put_chunk("a0", &["n1".to_string()], 1, "h").await.unwrap();

        let files: Vec<_> = catalog
            .list_files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(files, vec!["a.bin", "b.bin"]);
        assert_eq!(catalog.list_chunks().await.unwrap().len(), 1);
    }
    /// `.` and `..` resolve away as URL path segments, so every binding
    /// rejects them alike.
    pub async fn dot_names(catalog: &dyn Catalog) {
        for name in [".", ".."] {
            assert!(matches!(
                catalog.put_file(name, &["c0".to_string()], 1).await,
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                catalog.get_file(name).await,
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                catalog.delete_file(name).await,
                Err(Error::InvalidArgument(_))
            ));
        }

        // Dots inside a name are ordinary characters
        catalog.put_file("...", &["c0".to_string()], 1).await.unwrap();
        catalog.put_file(".hidden", &["c1".to_string()], 1).await.unwrap();
        assert_eq!(catalog.get_file("...").await.unwrap().chunk_ids, vec!["c0"]);
        assert_eq!(catalog.get_file(".hidden").await.unwrap().chunk_ids, vec!["c1"]);
        catalog.delete_file("...").await.unwrap();
        assert!(matches!(
            catalog.get_file("...").await,
            Err(Error::NotFound(_))
        ));
    }

    /// A file whose chunk id list is several megabytes once serialized.
    pub async fn large_file_record(catalog: &dyn Catalog) {
        let chunk_ids: Vec<String> = (0..100_000)
            .map(|_| crate::common::generate_chunk_id())
            .collect();
        catalog.put_file("huge.bin", &chunk_ids, 100_000).await.unwrap();

        let file = catalog.get_file("huge.bin").await.unwrap();
        assert_eq!(file.chunk_ids.len(), 100_000);
        assert_eq!(file.chunk_ids, chunk_ids);
    }
}
