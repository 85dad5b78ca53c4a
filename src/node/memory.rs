//! In-process storage node

use crate::common::{Error, Result};
use crate::coordinator::node_client::{NodeHealth, StorageNode, StoredChunk};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Instant;

/// Storage node holding chunks in memory. Used for embedding and tests.
pub struct MemoryNode {
    id: String,
    address: String,
    capacity_bytes: u64,
    chunks: RwLock<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    started: Instant,
}

impl MemoryNode {
    pub fn new(id: impl Into<String>, capacity_bytes: u64) -> Self {
        let id = id.into();
        Self {
            address: format!("memory://{}", id),
            id,
            capacity_bytes,
            chunks: RwLock::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Ids of the chunks held, sorted.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.chunks
            .read()
            .map(|c| c.contains_key(chunk_id))
            .unwrap_or(false)
    }

    /// Overwrite stored bytes without any checks.
    pub fn corrupt(&self, chunk_id: &str, data: Bytes) -> Result<()> {
        let mut chunks = self.write()?;
        match chunks.get_mut(chunk_id) {
            Some(slot) => {
                slot.0 = data;
                Ok(())
            }
            None => Err(Error::NotFound(format!("Chunk {}", chunk_id))),
        }
    }

    /// Insert bytes with an explicit write time.
    pub fn insert_at(&self, chunk_id: &str, data: Bytes, stored_at: DateTime<Utc>) -> Result<()> {
        self.write()?.insert(chunk_id.to_string(), (data, stored_at));
        Ok(())
    }

    fn used_bytes(&self) -> u64 {
        self.chunks
            .read()
            .map(|c| c.values().map(|(b, _)| b.len() as u64).sum())
            .unwrap_or(0)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, (Bytes, DateTime<Utc>)>>> {
        self.chunks
            .write()
            .map_err(|_| Error::Internal("memory node lock poisoned".into()))
    }
}

#[async_trait::async_trait]
impl StorageNode for MemoryNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn store_chunk(&self, chunk_id: &str, data: Bytes) -> Result<()> {
        let used = self.used_bytes();
        if used + data.len() as u64 > self.capacity_bytes {
            return Err(Error::CapacityExceeded(format!(
                "{} bytes requested on {}, {} free",
                data.len(),
                self.id,
                self.capacity_bytes.saturating_sub(used)
            )));
        }
        self.write()?
            .insert(chunk_id.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Bytes> {
        self.chunks
            .read()
            .map_err(|_| Error::Internal("memory node lock poisoned".into()))?
            .get(chunk_id)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::NotFound(format!("Chunk {} on {}", chunk_id, self.id)))
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        self.write()?
            .remove(chunk_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Chunk {} on {}", chunk_id, self.id)))
    }

    async fn node_health(&self) -> Result<NodeHealth> {
        let chunk_count = self.chunks.read().map(|c| c.len() as u64).unwrap_or(0);
        Ok(NodeHealth {
            status: "healthy".to_string(),
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            free_space: self.capacity_bytes.saturating_sub(self.used_bytes()),
            chunk_count,
        })
    }

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| Error::Internal("memory node lock poisoned".into()))?;
        Ok(chunks
            .iter()
            .map(|(id, (data, stored_at))| StoredChunk {
                chunk_id: id.clone(),
                size: data.len() as u64,
                stored_at: *stored_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_fetch_delete() {
        let node = MemoryNode::new("m1", 1024);
        node.store_chunk("c1", Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(node.fetch_chunk("c1").await.unwrap(), Bytes::from_static(b"abc"));

        let health = node.node_health().await.unwrap();
        assert_eq!(health.free_space, 1021);
        assert_eq!(health.chunk_count, 1);

        node.delete_chunk("c1").await.unwrap();
        assert!(matches!(node.fetch_chunk("c1").await, Err(Error::NotFound(_))));
        assert!(matches!(node.delete_chunk("c1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_capacity() {
        let node = MemoryNode::new("m1", 4);
        assert!(matches!(
            node.store_chunk("c1", Bytes::from_static(b"hello")).await,
            Err(Error::CapacityExceeded(_))
        ));
    }
}
