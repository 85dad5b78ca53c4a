//! Error types for chunkvault

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Catalog Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Storage Node Errors ===
    #[error("Storage node {node} unreachable: {reason}")]
    NodeUnreachable { node: String, reason: String },

    #[error("Storage node {node} failed: {reason}")]
    NodeError { node: String, reason: String },

    #[error("No available storage node")]
    NoAvailableNode,

    #[error("Insufficient storage: {0}")]
    CapacityExceeded(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // === Workflow Errors ===
    #[error("Partial failure: {failed} of {total} chunk operations failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Input / Config Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::NodeUnreachable { .. } | Error::NoAvailableNode
        )
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::NodeUnreachable { .. } => "node_unreachable",
            Error::NodeError { .. } => "node_error",
            Error::NoAvailableNode => "no_available_node",
            Error::CapacityExceeded(_) => "capacity_exceeded",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::PartialFailure { .. } => "partial_failure",
            Error::IntegrityViolation(_) => "integrity_violation",
            Error::Cancelled(_) => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => "invalid_argument",
            _ => "internal",
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::NoAvailableNode => StatusCode::SERVICE_UNAVAILABLE,
            Error::CapacityExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NodeUnreachable { .. } | Error::NodeError { .. } => StatusCode::BAD_GATEWAY,
            Error::PartialFailure { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured `{status, kind, message}` error body
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.to_http_status();
        let body = serde_json::json!({
            "status": "error",
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MetadataCorrupted(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Http(format!("invalid JSON body: {}", e))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            Error::NotFound("x".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::AlreadyExists("x".into()).to_http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::NoAvailableNode.to_http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::NodeUnreachable {
                node: "n1".into(),
                reason: "timeout".into()
            }
            .to_http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::NoAvailableNode.is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(!Error::IntegrityViolation("x".into()).is_retryable());
    }
}
