//! Coordinator
//!
//! The coordinator is responsible for:
//! - Partitioning files into chunks and reassembling them
//! - Placement decisions (round robin, least load, HRW)
//! - Upload, download and delete orchestration against storage nodes
//! - Health monitoring of registered nodes

pub mod chunker;
pub mod http;
pub mod node_client;
pub mod placement;
pub mod registry;
pub mod server;
pub mod workflow;

pub use node_client::{HttpStorageNode, NodeHealth, StorageNode, StoredChunk};
pub use placement::PlacementPolicy;
pub use registry::{NodeRegistry, NodeView};
pub use server::CoordinatorServer;
pub use workflow::{
    Coordinator, DeleteReport, DeleteStatus, HealthReport, UploadReceipt, WorkflowSettings,
};
