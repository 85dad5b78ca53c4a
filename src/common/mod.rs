//! Common utilities and types shared across chunkvault

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod utils;

pub use config::{
    CatalogConfig, CatalogLocation, Config, CoordinatorConfig, NodeConfig, NodeEndpoint,
    PlacementKind,
};
pub use error::{Error, Result};
pub use hash::{blake3_hash, hrw_hash, hrw_weight};
pub use metrics::CoordinatorMetrics;
pub use utils::{
    decode_name, encode_name, format_bytes, generate_chunk_id, shutdown_signal, validate_file_name,
    validate_id,
};
