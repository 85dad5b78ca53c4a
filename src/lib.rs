//! # chunkvault
//!
//! Chunked file storage across independent storage nodes:
//! - Files are split into fixed-size chunks placed on storage nodes
//! - A metadata catalog records files, chunks and nodes (RocksDB, in memory,
//!   or a standalone service)
//! - The coordinator sequences upload, download and delete, and aggregates
//!   node health
//! - Maintenance passes verify the catalog and reap orphaned chunks
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            ┌──────────────────────┐       ┌───────────────────┐
//!  client ──▶│     Coordinator      │──────▶│  Metadata Catalog │
//!            │ chunking, placement, │       │  files / chunks / │
//!            │ reassembly, health   │       │  servers          │
//!            └──────────┬───────────┘       └───────────────────┘
//!                       │ HTTP
//!        ┌──────────────┼──────────────┐
//!  ┌─────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐
//!  │  Node 1    │ │  Node 2    │ │  Node 3    │
//!  │ flat files │ │ flat files │ │ flat files │
//!  └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start storage nodes
//! ```bash
//! chunkvault-node serve --id node-1 --bind 0.0.0.0:5003 --data ./node-1
//! ```
//!
//! ### Start a coordinator
//! ```bash
//! chunkvault-coord serve \
//!   --bind 0.0.0.0:5002 \
//!   --db ./coord-data/catalog \
//!   --nodes node-1=http://localhost:5003,node-2=http://localhost:5004
//! ```
//!
//! Or point it at a standalone catalog started with `chunkvault-catalog`
//! using `--catalog-url http://localhost:5001`.
//!
//! ### Use the CLI
//! ```bash
//! chunkvault upload ./report.pdf
//! chunkvault download report.pdf --output ./out.pdf
//! chunkvault delete report.pdf
//! chunkvault health
//! chunkvault gc --dry-run
//! ```

pub mod catalog;
pub mod common;
pub mod coordinator;
pub mod node;
pub mod ops;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use catalog::Catalog;
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
