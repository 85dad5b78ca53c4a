//! In-memory catalog, used for embedding and tests

use super::{Catalog, ChunkRecord, FileRecord, ServerRecord};
use crate::common::{validate_file_name, Error, Result};
use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    files: BTreeMap<String, FileRecord>,
    chunks: BTreeMap<String, ChunkRecord>,
    servers: BTreeMap<String, ServerRecord>,
}

/// Catalog held in process memory. Lost on restart.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Internal("catalog lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Internal("catalog lock poisoned".into()))
    }
}

fn insert<T>(map: &mut BTreeMap<String, T>, kind: &str, key: &str, value: T) -> Result<()> {
    match map.entry(key.to_string()) {
        Entry::Occupied(_) => {
            tracing::warn!("{} {} already exists in catalog", kind, key);
            Err(Error::AlreadyExists(format!("{} {}", kind, key)))
        }
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Catalog for MemoryCatalog {
    async fn put_file(&self, name: &str, chunk_ids: &[String], size: u64) -> Result<()> {
        validate_file_name(name)?;
        let record = FileRecord {
            name: name.to_string(),
            chunk_ids: chunk_ids.to_vec(),
            size,
            upload_time: Utc::now(),
        };
        insert(&mut self.write()?.files, "File", name, record)
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
        insert(&mut self.write()?.chunks, "Chunk", chunk_id, record)
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
        insert(&mut self.write()?.servers, "Server", server_id, record)
    }

    async fn update_server(&self, server_id: &str, status: &str, load: u64) -> Result<()> {
        let mut tables = self.write()?;
        let record = tables
            .servers
            .get_mut(server_id)
            .ok_or_else(|| Error::NotFound(format!("Server {}", server_id)))?;
        record.status = status.to_string();
        record.load = load;
        Ok(())
    }

    async fn get_file(&self, name: &str) -> Result<FileRecord> {
        validate_file_name(name)?;
        self.read()?
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("File {}", name)))
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<ChunkRecord> {
        self.read()?
            .chunks
            .get(chunk_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Chunk {}", chunk_id)))
    }

    async fn get_server(&self, server_id: &str) -> Result<ServerRecord> {
        self.read()?
            .servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Server {}", server_id)))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        self.write()?.files.remove(name);
        Ok(())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        self.write()?.chunks.remove(chunk_id);
        Ok(())
    }

    async fn delete_server(&self, server_id: &str) -> Result<()> {
        self.write()?.servers.remove(server_id);
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.read()?.servers.values().cloned().collect())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.read()?.files.values().cloned().collect())
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>> {
        Ok(self.read()?.chunks.values().cloned().collect())
    }
}
