//! Maintenance operations

pub mod gc;
pub mod verify;

pub use gc::{collect_garbage, GcReport};
pub use verify::{verify_catalog, VerifyReport};
