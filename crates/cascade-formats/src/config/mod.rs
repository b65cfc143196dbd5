//! Text configuration files that bootstrap an installation
//!
//! - [`BuildInfo`]: the pipe-separated `.build.info` table at the install root,
//!   naming the active build and CDN config keys
//! - [`BuildConfig`]: `key = value` file with the root and encoding keys
//! - [`CdnConfig`]: `key = value` file listing the CDN archives

mod build_config;
mod build_info;
mod cdn_config;

pub use build_config::BuildConfig;
pub use build_info::{BuildInfo, BuildInfoEntry};
pub use cdn_config::CdnConfig;

use thiserror::Error;

/// Configuration parsing errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File has no header line
    #[error("empty configuration file")]
    Empty,

    /// Malformed `.build.info` header
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Data row with the wrong number of fields
    #[error("row {row} has {actual} fields, header declares {expected}")]
    RowLength {
        /// Zero-based data row
        row: usize,
        /// Header column count
        expected: usize,
        /// Fields in the row
        actual: usize,
    },

    /// No row is marked active
    #[error("no active build in .build.info")]
    NoActiveBuild,

    /// Required key or column absent or empty
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Hash value that is not 32 hex digits
    #[error("invalid hash for {field}: '{value}'")]
    InvalidHash {
        /// Field the hash came from
        field: String,
        /// Offending value
        value: String,
    },
}

/// Result type for configuration parsing
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Split a `key = value` line
pub(crate) fn parse_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, " = ");
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if is_valid_key(key) {
        Some((key.to_string(), value.to_string()))
    } else {
        None
    }
}

/// Config keys are alphanumeric with `-` and `_`
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// 32 hex characters
pub(crate) fn is_valid_md5_hex(hash: &str) -> bool {
    hash.len() == 32 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a hash value, naming `field` in the error
pub(crate) fn require_md5_hex<'a>(field: &str, value: &'a str) -> ConfigResult<&'a str> {
    if is_valid_md5_hex(value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidHash {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Read `key = value` lines, splitting each value on whitespace
///
/// Repeated keys append to the earlier values.
pub(crate) fn parse_key_values<R: std::io::Read>(
    reader: R,
) -> ConfigResult<std::collections::HashMap<String, Vec<String>>> {
    use std::io::BufRead;

    let mut entries: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();
    for line in std::io::BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = parse_line(line) {
            entries
                .entry(key)
                .or_default()
                .extend(value.split_whitespace().map(String::from));
        }
    }
    Ok(entries)
}
