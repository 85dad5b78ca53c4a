//! Fault injection for storage nodes
//!
//! [`FaultyNode`] wraps any [`StorageNode`] and can be told to go dark,
//! stall, fail stores after a number of successes, fail deletes, or serve
//! one chunk's bytes in place of another's.
//!
//! Only built for tests and with the `testing` feature.

use crate::common::{Error, Result};
use crate::coordinator::node_client::{NodeHealth, StorageNode, StoredChunk};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    delay: Option<Duration>,
    fail_stores_after: Option<usize>,
    fail_deletes: bool,
    swapped: HashMap<String, String>,
}

pub struct FaultyNode {
    inner: Arc<dyn StorageNode>,
    faults: Mutex<Faults>,
    stores: AtomicUsize,
}

impl FaultyNode {
    pub fn new(inner: Arc<dyn StorageNode>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            stores: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `NodeUnreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults().unreachable = unreachable;
    }

    /// Every call sleeps first.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults().delay = delay;
    }

    /// Allow `n` more successful stores, then fail the rest.
    pub fn fail_stores_after(&self, n: usize) {
        self.stores.store(0, Ordering::SeqCst);
        self.faults().fail_stores_after = Some(n);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.faults().fail_deletes = fail;
    }

    /// Serve the bytes of `b` when `a` is fetched and vice versa.
    pub fn swap_chunks(&self, a: &str, b: &str) {
        let mut faults = self.faults();
        faults.swapped.insert(a.to_string(), b.to_string());
        faults.swapped.insert(b.to_string(), a.to_string());
    }

    pub fn stores_attempted(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn gate(&self) -> Result<()> {
        let (unreachable, delay) = {
            let faults = self.faults();
            (faults.unreachable, faults.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unreachable {
            return Err(Error::NodeUnreachable {
                node: self.inner.id().to_string(),
                reason: "connection refused (injected)".into(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageNode for FaultyNode {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn store_chunk(&self, chunk_id: &str, data: Bytes) -> Result<()> {
        self.gate().await?;
        let attempt = self.stores.fetch_add(1, Ordering::SeqCst);
        let limit = self.faults().fail_stores_after;
        if matches!(limit, Some(n) if attempt >= n) {
            return Err(Error::NodeError {
                node: self.inner.id().to_string(),
                reason: format!("store of {} rejected (injected)", chunk_id),
            });
        }
        self.inner.store_chunk(chunk_id, data).await
    }

    async fn fetch_chunk(&self, chunk_id: &str) -> Result<Bytes> {
        self.gate().await?;
        let target = self
            .faults()
            .swapped
            .get(chunk_id)
            .cloned()
            .unwrap_or_else(|| chunk_id.to_string());
        self.inner.fetch_chunk(&target).await
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        self.gate().await?;
        if self.faults().fail_deletes {
            return Err(Error::NodeError {
                node: self.inner.id().to_string(),
                reason: format!("delete of {} rejected (injected)", chunk_id),
            });
        }
        self.inner.delete_chunk(chunk_id).await
    }

    async fn node_health(&self) -> Result<NodeHealth> {
        self.gate().await?;
        self.inner.node_health().await
    }

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>> {
        self.gate().await?;
        self.inner.list_chunks().await
    }
}
