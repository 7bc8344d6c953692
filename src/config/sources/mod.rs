//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides file-based sources (YAML, JSON, TOML) gated by feature flags,
//! the Redis publish/subscribe source, the in-memory source, and the
//! [`parse_routes_str`] helper for format-specific deserialization.

pub mod file_source;
pub mod memory;

#[cfg(feature = "yaml")]
pub mod yaml;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "toml")]
pub mod toml_source;

#[cfg(feature = "redis")]
pub mod redis_source;

use sha2::{Digest, Sha256};

use crate::config::model::RoutesFile;
use crate::error::MeshError;

/// Parse a routes file based on its extension.
pub fn parse_routes_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<RoutesFile, MeshError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| MeshError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| MeshError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| MeshError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(MeshError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let a = sha256_hex(b"routes");
        assert_eq!(a.len(), 64);
        assert_eq!(a, sha256_hex(b"routes"));
        assert_ne!(a, sha256_hex(b"routes2"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            parse_routes_str("xml", "<routes/>", "routes.xml"),
            Err(MeshError::UnsupportedFormat(ext)) if ext == "xml"
        ));
    }
}
