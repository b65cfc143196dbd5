//! CDN config files
//!
//! Lists the data archives of a build. An archive's position in `archives`
//! is the archive number recorded in entries of its `.index` file.

use std::collections::HashMap;
use std::io::Read;

use super::{ConfigResult, parse_key_values, require_md5_hex};

/// Parsed CDN config
#[derive(Debug, Clone, Default)]
pub struct CdnConfig {
    entries: HashMap<String, Vec<String>>,
}

impl CdnConfig {
    /// Parse a CDN config stream
    pub fn parse<R: Read>(reader: R) -> ConfigResult<Self> {
        Ok(Self {
            entries: parse_key_values(reader)?,
        })
    }

    /// All values of a key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Archive keys in list order
    pub fn archives(&self) -> &[String] {
        self.get("archives").unwrap_or_default()
    }

    /// Archive keys, each checked to be 32 hex digits
    pub fn validated_archives(&self) -> ConfigResult<Vec<&str>> {
        self.archives()
            .iter()
            .map(|archive| require_md5_hex("archives", archive))
            .collect()
    }

    /// Combined archive group index key
    pub fn archive_group(&self) -> Option<&str> {
        self.get("archive-group")?.first().map(String::as_str)
    }

    /// Loose file index key
    pub fn file_index(&self) -> Option<&str> {
        self.get("file-index")?.first().map(String::as_str)
    }
}
