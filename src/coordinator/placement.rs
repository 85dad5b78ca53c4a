//! Chunk placement strategies
//!
//! A policy is a pure function of the candidate view and the chunk being
//! placed. It never does I/O, so every strategy is testable on its own.

use super::registry::NodeView;
use crate::common::{hrw_hash, Error, PlacementKind, Result};

/// The chunk being placed
#[derive(Debug, Clone, Copy)]
pub struct ChunkRef<'a> {
    /// Position of the chunk within its file
    pub index: usize,
    pub chunk_id: &'a str,
}

/// Chooses the node that receives a chunk.
pub trait PlacementPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the id of the chosen candidate, or `NoAvailableNode` when
    /// `candidates` is empty.
    fn select_node(&self, candidates: &[NodeView], chunk: ChunkRef<'_>) -> Result<String>;
}

/// Build the policy named in configuration.
pub fn from_kind(kind: PlacementKind) -> Box<dyn PlacementPolicy> {
    match kind {
        PlacementKind::RoundRobin => Box::new(RoundRobin),
        PlacementKind::LeastLoad => Box::new(LeastLoad),
        PlacementKind::ConsistentHash => Box::new(ConsistentHash),
    }
}

/// `index mod n` over candidates sorted by id
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl PlacementPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select_node(&self, candidates: &[NodeView], chunk: ChunkRef<'_>) -> Result<String> {
        if candidates.is_empty() {
            return Err(Error::NoAvailableNode);
        }
        let mut ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        Ok(ids[chunk.index % ids.len()].to_string())
    }
}

/// Lowest reported load wins, ties broken by id
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoad;

impl PlacementPolicy for LeastLoad {
    fn name(&self) -> &'static str {
        "least_load"
    }

    fn select_node(&self, candidates: &[NodeView], _chunk: ChunkRef<'_>) -> Result<String> {
        candidates
            .iter()
            .min_by(|a, b| a.load.cmp(&b.load).then_with(|| a.id.cmp(&b.id)))
            .map(|c| c.id.clone())
            .ok_or(Error::NoAvailableNode)
    }
}

/// Highest random weight over (chunk id, node id)
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsistentHash;

impl PlacementPolicy for ConsistentHash {
    fn name(&self) -> &'static str {
        "consistent_hash"
    }

    fn select_node(&self, candidates: &[NodeView], chunk: ChunkRef<'_>) -> Result<String> {
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        hrw_hash(chunk.chunk_id, &ids)
            .into_iter()
            .next()
            .ok_or(Error::NoAvailableNode)
    }
}

/// Place every chunk of one upload against a snapshot of the candidates.
///
/// Each pick bumps the chosen node's snapshot load by one, so load-aware
/// policies spread a single upload instead of piling it on one node.
pub fn plan(
    policy: &dyn PlacementPolicy,
    candidates: &[NodeView],
    chunk_ids: &[String],
) -> Result<Vec<String>> {
    let mut view = candidates.to_vec();
    let mut targets = Vec::with_capacity(chunk_ids.len());
    for (index, chunk_id) in chunk_ids.iter().enumerate() {
        let target = policy.select_node(&view, ChunkRef { index, chunk_id })?;
        if let Some(node) = view.iter_mut().find(|n| n.id == target) {
            node.load += 1;
        }
        targets.push(target);
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: &str, load: u64) -> NodeView {
        NodeView {
            id: id.to_string(),
            address: format!("http://{}", id),
            status: "healthy".to_string(),
            healthy: true,
            load,
            last_checked: None,
        }
    }

    fn chunk(index: usize) -> ChunkRef<'static> {
        ChunkRef {
            index,
            chunk_id: "chunk",
        }
    }

    #[test]
    fn test_empty_candidates_fail_fast() {
        for policy in [
            from_kind(PlacementKind::RoundRobin),
            from_kind(PlacementKind::LeastLoad),
            from_kind(PlacementKind::ConsistentHash),
        ] {
            assert!(matches!(
                policy.select_node(&[], chunk(0)),
                Err(Error::NoAvailableNode)
            ));
        }
    }

    #[test]
    fn test_round_robin_cycles_sorted_ids() {
        let nodes = vec![view("n2", 0), view("n1", 0), view("n3", 0)];
        let picks: Vec<_> = (0..4)
            .map(|i| RoundRobin.select_node(&nodes, chunk(i)).unwrap())
            .collect();
        assert_eq!(picks, vec!["n1", "n2", "n3", "n1"]);
    }

    #[test]
    fn test_least_load() {
        let nodes = vec![view("n1", 5), view("n2", 1), view("n3", 1)];
        assert_eq!(LeastLoad.select_node(&nodes, chunk(0)).unwrap(), "n2");
    }

    #[test]
    fn test_consistent_hash_is_stable() {
        let nodes = vec![view("n1", 0), view("n2", 0), view("n3", 0)];
        let c = ChunkRef {
            index: 0,
            chunk_id: "3f2a",
        };
        let first = ConsistentHash.select_node(&nodes, c).unwrap();
        let reordered = vec![view("n3", 0), view("n1", 0), view("n2", 0)];
        assert_eq!(ConsistentHash.select_node(&reordered, c).unwrap(), first);
    }

    #[test]
    fn test_plan_spreads_least_load() {
        let nodes = vec![view("n1", 0), view("n2", 0), view("n3", 0)];
        let ids: Vec<String> = (0..6).map(|i| format!("c{}", i)).collect();
        let targets = plan(&LeastLoad, &nodes, &ids).unwrap();
        for id in ["n1", "n2", "n3"] {
            assert_eq!(targets.iter().filter(|t| *t == id).count(), 2);
        }
    }
}
