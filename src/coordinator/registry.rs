//! Registry of known storage nodes and their last observed health

use super::node_client::StorageNode;
use crate::common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub const STATUS_HEALTHY: &str = "healthy";
pub const STATUS_UNREACHABLE: &str = "unreachable";

/// Placement-relevant view of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub address: String,
    pub status: String,
    pub healthy: bool,
    /// Chunk count reported at the last health check
    pub load: u64,
    pub last_checked: Option<DateTime<Utc>>,
}

struct Entry {
    node: Arc<dyn StorageNode>,
    view: NodeView,
}

/// Registered storage nodes, keyed by id.
///
/// Built explicitly and handed to the coordinator; refreshed by health checks.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<String, Entry>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a fixed node list.
    pub fn with_nodes(nodes: impl IntoIterator<Item = Arc<dyn StorageNode>>) -> Result<Self> {
        let registry = Self::new();
        for node in nodes {
            registry.register(node)?;
        }
        Ok(registry)
    }

    /// Add or replace a node. New nodes are assumed healthy until checked.
    /// Returns `true` when an existing entry was replaced.
    pub fn register(&self, node: Arc<dyn StorageNode>) -> Result<bool> {
        let view = NodeView {
            id: node.id().to_string(),
            address: node.address().to_string(),
            status: STATUS_HEALTHY.to_string(),
            healthy: true,
            load: 0,
            last_checked: None,
        };
        let mut nodes = self.write()?;
        let replaced = nodes
            .insert(view.id.clone(), Entry { node, view })
            .is_some();
        Ok(replaced)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    pub fn get(&self, id: &str) -> Result<Option<Arc<dyn StorageNode>>> {
        Ok(self.read()?.get(id).map(|e| e.node.clone()))
    }

    /// All registered node handles, in id order.
    pub fn nodes(&self) -> Result<Vec<Arc<dyn StorageNode>>> {
        Ok(self.read()?.values().map(|e| e.node.clone()).collect())
    }

    pub fn snapshot(&self) -> Result<Vec<NodeView>> {
        Ok(self.read()?.values().map(|e| e.view.clone()).collect())
    }

    /// Nodes currently considered healthy; the placement candidates.
    pub fn healthy(&self) -> Result<Vec<NodeView>> {
        Ok(self
            .read()?
            .values()
            .filter(|e| e.view.healthy)
            .map(|e| e.view.clone())
            .collect())
    }

    pub fn mark_healthy(&self, id: &str, load: u64) -> Result<()> {
        self.update(id, |view| {
            view.status = STATUS_HEALTHY.to_string();
            view.healthy = true;
            view.load = load;
        })
    }

    pub fn mark_unreachable(&self, id: &str) -> Result<()> {
        self.update(id, |view| {
            view.status = STATUS_UNREACHABLE.to_string();
            view.healthy = false;
        })
    }

    pub fn len(&self) -> usize {
        self.read().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut NodeView)) -> Result<()> {
        let mut nodes = self.write()?;
        let entry = nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Node {}", id)))?;
        f(&mut entry.view);
        entry.view.last_checked = Some(Utc::now());
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.nodes
            .read()
            .map_err(|_| Error::Internal("node registry lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.nodes
            .write()
            .map_err(|_| Error::Internal("node registry lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MemoryNode;

    fn node(id: &str) -> Arc<dyn StorageNode> {
        Arc::new(MemoryNode::new(id, 1 << 20))
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = NodeRegistry::with_nodes([node("b"), node("a")]).unwrap();
        let ids: Vec<_> = registry.snapshot().unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(registry.snapshot().unwrap().iter().all(|v| v.healthy));
        assert!(registry.register(node("a")).unwrap());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_mark_changes_candidates() {
        let registry = NodeRegistry::with_nodes([node("a"), node("b")]).unwrap();
        registry.mark_unreachable("a").unwrap();
        let healthy: Vec<_> = registry.healthy().unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(healthy, vec!["b"]);

        registry.mark_healthy("a", 12).unwrap();
        let a = registry
            .snapshot()
            .unwrap()
            .into_iter()
            .find(|v| v.id == "a")
            .unwrap();
        assert!(a.healthy);
        assert_eq!(a.load, 12);
        assert!(a.last_checked.is_some());
    }

    #[test]
    fn test_mark_unknown_node() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.mark_unreachable("ghost"),
            Err(Error::NotFound(_))
        ));
    }
}
