//! Utility functions for chunkvault

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Percent-encoding set for names placed in URL path segments
const NAME_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Encode a file name or id for use as a URL path segment
pub fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_ENCODE_SET).to_string()
}

/// Decode a percent-encoded name
pub fn decode_name(encoded: &str) -> crate::Result<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|e| crate::Error::InvalidArgument(format!("Failed to decode name: {}", e)))
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Validate a file name (non-empty, reasonable length, no control chars).
///
/// Names travel as URL path segments, where `.` and `..` are dot segments
/// that URL parsers resolve away, so both are rejected.
pub fn validate_file_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidArgument(
            "file name cannot be empty".into(),
        ));
    }

    if name == "." || name == ".." {
        return Err(crate::Error::InvalidArgument(format!(
            "invalid file name: {}",
            name
        )));
    }

    if name.len() > 1024 {
        return Err(crate::Error::InvalidArgument(
            "file name too long (max 1024 bytes)".into(),
        ));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidArgument(
            "file name contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Validate a chunk or server id.
///
/// Ids end up as file names on storage nodes, so only ASCII alphanumerics,
/// `-`, `_` and `.` are allowed, and `.`/`..` are rejected.
pub fn validate_id(id: &str) -> crate::Result<()> {
    if id.is_empty() || id.len() > 255 {
        return Err(crate::Error::InvalidArgument(format!(
            "invalid id length: {}",
            id.len()
        )));
    }
    if id == "." || id == ".." {
        return Err(crate::Error::InvalidArgument(format!("invalid id: {}", id)));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(crate::Error::InvalidArgument(format!(
            "id contains invalid characters: {}",
            id
        )));
    }
    Ok(())
}

/// Generate a fresh random chunk id
pub fn generate_chunk_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Resolves on Ctrl-C. Used for graceful server shutdown.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_name() {
        let name = "reports/q1 summary.pdf";
        let encoded = encode_name(name);
        assert!(encoded.contains("%2F"));
        assert!(encoded.contains("%20"));

        let decoded = decode_name(&encoded).unwrap();
        assert_eq!(decoded, name);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(150 * 1024 * 1024), "150.00 MB");
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("path/to/file").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("bad\nname").is_err());
        assert!(validate_file_name(&"x".repeat(2000)).is_err());
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("...").is_ok());
        assert!(validate_file_name("../up").is_ok());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("0f3a9c-chunk_1.bin").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("..").is_err());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a,b").is_err());
    }

    #[test]
    fn test_generate_chunk_id() {
        let id1 = generate_chunk_id();
        let id2 = generate_chunk_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(validate_id(&id1).is_ok());
    }
}
