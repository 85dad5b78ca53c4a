//! Durable catalog on RocksDB
//!
//! One column family per record type:
//! - `files`: name → FileRecord
//! - `chunks`: chunk_id → ChunkRecord
//! - `servers`: server_id → ServerRecord
//!
//! Values are bincode-encoded, so id lists are stored as arrays and need no
//! delimiter.

use super::{Catalog, ChunkRecord, FileRecord, ServerRecord};
use crate::common::{validate_file_name, Error, Result};
use chrono::Utc;
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

const CF_FILES: &str = "files";
const CF_CHUNKS: &str = "chunks";
const CF_SERVERS: &str = "servers";

/// Catalog stored in a local RocksDB instance
pub struct RocksCatalog {
    db: DB,
    /// Serializes check-then-insert so concurrent inserts of one key cannot
    /// both succeed.
    write_lock: Mutex<()>,
}

impl RocksCatalog {
    /// Open or create catalog
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_FILES, CF_CHUNKS, CF_SERVERS])?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::MetadataCorrupted(format!("missing column family {}", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &str) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &str, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)
            .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db.put_cf_opt(self.cf(cf)?, key.as_bytes(), bytes, &opts)?;
        Ok(())
    }

    /// Insert `value` under `key` unless the key already exists.
    fn insert<T: Serialize>(&self, cf: &str, kind: &str, key: &str, value: &T) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Internal("catalog write lock poisoned".into()))?;

        if self.db.get_pinned_cf(self.cf(cf)?, key.as_bytes())?.is_some() {
            tracing::warn!("{} {} already exists in catalog", kind, key);
            return Err(Error::AlreadyExists(format!("{} {}", kind, key)));
        }
        self.write(cf, key, value)
    }

    fn remove(&self, cf: &str, key: &str) -> Result<()> {
        self.db.delete_cf(self.cf(cf)?, key.as_bytes())?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let iter = self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start);

        let mut records = Vec::new();
        for item in iter {
            let (_, value_bytes) = item?;
            records.push(bincode::deserialize(&value_bytes)?);
        }
        Ok(records)
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Catalog for RocksCatalog {
    async fn put_file(&self, name: &str, chunk_ids: &[String], size: u64) -> Result<()> {
        validate_file_name(name)?;
        let record = FileRecord {
            name: name.to_string(),
            chunk_ids: chunk_ids.to_vec(),
            size,
            upload_time: Utc::now(),
        };
        self.insert(CF_FILES, "File", name, &record)
    }

    async fn put_chunk(
        &self,
        chunk_id: &str,
        replicas: &[String],
        size: u64,
        checksum: &str,
    ) -> Result<()> {
        let record = ChunkRecord {
            chunk_id: chunk_id.to_string(),
            replica_locations: replicas.to_vec(),
            size,
            checksum: checksum.to_string(),
            last_verified: Utc::now(),
        };
        self.insert(CF_CHUNKS, "Chunk", chunk_id, &record)
    }

    async fn put_server(
        &self,
        server_id: &str,
        address: &str,
        status: &str,
        load: u64,
    ) -> Result<()> {
        let record = ServerRecord {
            server_id: server_id.to_string(),
            address: address.to_string(),
            status: status.to_string(),
            load,
        };
        self.insert(CF_SERVERS, "Server", server_id, &record)
    }

    async fn update_server(&self, server_id: &str, status: &str, load: u64) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Internal("catalog write lock poisoned".into()))?;

        let mut record: ServerRecord = self
            .read(CF_SERVERS, server_id)?
            .ok_or_else(|| Error::NotFound(format!("Server {}", server_id)))?;
        record.status = status.to_string();
        record.load = load;
        self.write(CF_SERVERS, server_id, &record)
    }

    async fn get_file(&self, name: &str) -> Result<FileRecord> {
        validate_file_name(name)?;
        self.read(CF_FILES, name)?
            .ok_or_else(|| Error::NotFound(format!("File {}", name)))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRecord> {
        self.read(CF_CHUNKS, chunk_id)?
            .ok_or_else(|| Error::NotFound(format!("Chunk {}", chunk_id)))
    }

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord> {
        self.read(CF_SERVERS, server_id)?
            .ok_or_else(|| Error::NotFound(format!("Server {}", server_id)))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        self.remove(CF_FILES, name)
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        self.remove(CF_CHUNKS, chunk_id)
    }

    async fn delete_server(&self, server_id: &str) -> Result<()> {
        self.remove(CF_SERVERS, server_id)
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.scan(CF_SERVERS)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        self.scan(CF_FILES)
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>> {
        self.scan(CF_CHUNKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::conformance;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_lifecycle() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::file_lifecycle(&catalog).await;
    }

    #[tokio::test]
    async fn test_chunk_lifecycle() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::chunk_lifecycle(&catalog).await;
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::server_lifecycle(&catalog).await;
    }

    #[tokio::test]
    async fn test_listing() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::listing(&catalog).await;
    }

    #[tokio::test]
    async fn test_dot_names() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::dot_names(&catalog).await;
    }

    #[tokio::test]
    async fn test_large_file_record() {
        let dir = tempdir().unwrap();
        let catalog = RocksCatalog::open(dir.path().join("catalog")).unwrap();
        conformance::large_file_record(&catalog).await;
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog");

        {
            let catalog = RocksCatalog::open(&path).unwrap();
            catalog
                .put_file("a,b.txt", &["x1".to_string(), "x2".to_string()], 10)
                .await
                .unwrap();
            catalog.flush().unwrap();
        }

        let catalog = RocksCatalog::open(&path).unwrap();
        let file = catalog.get_file("a,b.txt").await.unwrap();
        assert_eq!(file.chunk_ids, vec!["x1", "x2"]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(RocksCatalog::open(dir.path().join("catalog")).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move {
                catalog
                    .put_file("same.bin", &[format!("chunk-{}", i)], 1)
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
