//! Reference storage node
//!
//! Holds chunk bytes by id and reports health. The coordinator reaches it
//! through [`crate::coordinator::HttpStorageNode`]; [`MemoryNode`] is the
//! in-process variant.

pub mod http;
pub mod memory;
pub mod server;
pub mod store;

pub use memory::MemoryNode;
pub use server::NodeServer;
pub use store::ChunkStore;
