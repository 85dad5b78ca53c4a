//! Flat-file chunk store
//!
//! Layout: `<data_dir>/<chunk_id>.chunk`. Writes go to a `.tmp` sibling
//! first and are renamed into place, so a crash never leaves a truncated
//! chunk under its final name.

use crate::common::{validate_id, Error, Result};
use crate::coordinator::node_client::StoredChunk;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const CHUNK_EXT: &str = "chunk";
const TMP_EXT: &str = "tmp";

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    bytes: u64,
    chunks: u64,
}

/// Chunk bytes on local disk, one file per chunk
pub struct ChunkStore {
    dir: PathBuf,
    capacity_bytes: u64,
    max_chunk_bytes: usize,
    usage: Mutex<Usage>,
}

impl ChunkStore {
    /// Open or create the store, counting what is already on disk.
    /// Leftover temp files from an interrupted write are removed.
    pub async fn open(dir: &Path, capacity_bytes: u64, max_chunk_bytes: usize) -> Result<Self> {
        fs::create_dir_all(dir).await?;

        let mut usage = Usage::default();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(CHUNK_EXT) => {
                    usage.bytes += entry.metadata().await?.len();
                    usage.chunks += 1;
                }
                Some(TMP_EXT) => {
                    tracing::warn!("Removing interrupted write {:?}", path);
                    let _ = fs::remove_file(&path).await;
                }
                _ => {}
            }
        }

        tracing::info!(
            "Chunk store at {:?}: {} chunks, {} bytes",
            dir,
            usage.chunks,
            usage.bytes
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            capacity_bytes,
            max_chunk_bytes,
            usage: Mutex::new(usage),
        })
    }

    fn path_for(&self, chunk_id: &str) -> Result<PathBuf> {
        validate_id(chunk_id)?;
        Ok(self.dir.join(format!("{}.{}", chunk_id, CHUNK_EXT)))
    }

    fn usage(&self) -> Result<std::sync::MutexGuard<'_, Usage>> {
        self.usage
            .lock()
            .map_err(|_| Error::Internal("chunk store lock poisoned".into()))
    }

    /// Store a chunk, replacing any previous bytes under the same id.
    pub async fn put(&self, chunk_id: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(chunk_id)?;
        if data.len() > self.max_chunk_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "chunk {} is {} bytes, limit is {}",
                chunk_id,
                data.len(),
                self.max_chunk_bytes
            )));
        }

        let previous = match fs::metadata(&path).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        // Reserve space before writing
        {
            let mut usage = self.usage()?;
            let after = usage.bytes.saturating_sub(previous.unwrap_or(0)) + data.len() as u64;
            if after > self.capacity_bytes {
                return Err(Error::CapacityExceeded(format!(
                    "{} bytes requested, {} free",
                    data.len(),
                    self.capacity_bytes.saturating_sub(usage.bytes)
                )));
            }
            usage.bytes = after;
            if previous.is_none() {
                usage.chunks += 1;
            }
        }

        if let Err(e) = self.write_atomic(&path, data).await {
            let mut usage = self.usage()?;
            usage.bytes = usage.bytes.saturating_sub(data.len() as u64) + previous.unwrap_or(0);
            if previous.is_none() {
                usage.chunks = usage.chunks.saturating_sub(1);
            }
            return Err(e);
        }

        tracing::debug!(chunk_id = %chunk_id, size = data.len(), "stored chunk");
        Ok(())
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let tmp = path.with_extension(TMP_EXT);
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn get(&self, chunk_id: &str) -> Result<Bytes> {
        let path = self.path_for(chunk_id)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Chunk {}", chunk_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, chunk_id: &str) -> Result<()> {
        let path = self.path_for(chunk_id)?;
        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Chunk {}", chunk_id)))
            }
            Err(e) => return Err(e.into()),
        };
        fs::remove_file(&path).await?;

        let mut usage = self.usage()?;
        usage.bytes = usage.bytes.saturating_sub(size);
        usage.chunks = usage.chunks.saturating_sub(1);
        tracing::debug!(chunk_id = %chunk_id, "deleted chunk");
        Ok(())
    }

    /// Every stored chunk with its size and write time, sorted by id.
    pub async fn list(&self) -> Result<Vec<StoredChunk>> {
        let mut chunks = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_EXT) {
                continue;
            }
            let Some(chunk_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let meta = entry.metadata().await?;
            let stored_at: DateTime<Utc> = meta.modified().map(DateTime::from)?;
            chunks.push(StoredChunk {
                chunk_id: chunk_id.to_string(),
                size: meta.len(),
                stored_at,
            });
        }
        chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(chunks)
    }

    pub fn used_bytes(&self) -> u64 {
        self.usage().map(|u| u.bytes).unwrap_or(0)
    }

    pub fn chunk_count(&self) -> u64 {
        self.usage().map(|u| u.chunks).unwrap_or(0)
    }

    pub fn free_space(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes())
    }
}
