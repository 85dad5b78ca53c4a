//! Hashing utilities for chunkvault
//!
//! - BLAKE3 for chunk checksums
//! - HRW (Highest Random Weight) for consistent placement

/// Compute BLAKE3 hash of data, return hex string
pub fn blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("{}", hash)
}

/// HRW weight of `node` for `key`.
pub fn hrw_weight(key: &str, node: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.as_bytes());
    hasher.update(&[0]);
    hasher.update(node.as_bytes());
    let hash = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(head)
}

/// HRW (Highest Random Weight) hashing for placement
///
/// Given a key and a set of nodes, returns nodes sorted by their weight
/// (deterministic based on key). Removing a node only moves the keys that
/// ranked it first.
pub fn hrw_hash(key: &str, nodes: &[String]) -> Vec<String> {
    let mut weights: Vec<(&String, u64)> = nodes
        .iter()
        .map(|node| (node, hrw_weight(key, node)))
        .collect();

    // Sort by weight (descending), ties by name
    weights.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    weights.into_iter().map(|(node, _)| node.clone()).collect()
}
