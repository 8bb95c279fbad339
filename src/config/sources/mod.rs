//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides [`FileSource`] (YAML, JSON and TOML, gated by feature flags)
//! and the [`parse_config_str`] helper for format-specific deserialization.

pub mod file_source;

pub use file_source::FileSource;

use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::error::GrayrouteError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, GrayrouteError> {
    let parsed: Result<Config, Box<dyn std::error::Error + Send + Sync>> = match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(Into::into),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(Into::into),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(Into::into),

        other => return Err(GrayrouteError::UnsupportedFormat(other.to_string())),
    };

    parsed.map_err(|source| GrayrouteError::ConfigParse {
        path: path_display.to_string(),
        source,
    })
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
    fn digest_is_stable_and_hex() {
        let a = sha256_hex(b"routing");
        assert_eq!(a.len(), 64);
        assert_eq!(a, sha256_hex(b"routing"));
        assert_ne!(a, sha256_hex(b"routing "));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = parse_config_str("ini", "", "grayroute.ini").unwrap_err();
        assert!(matches!(err, GrayrouteError::UnsupportedFormat(ref ext) if ext == "ini"));
    }
}
