//! Build config files
//!
//! `key = value` text naming the system files of one build. The values used
//! to open an installation:
//!
//! ```text
//! root = <root ckey>
//! encoding = <encoding ckey> <encoding ekey>
//! build-name = WOW-45745patch9.2.7_Retail
//! ```

use cascade_crypto::{ContentKey, EncodingKey};
use std::collections::HashMap;
use std::io::Read;

use super::{ConfigError, ConfigResult, parse_key_values, require_md5_hex};

/// Parsed build config
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    entries: HashMap<String, Vec<String>>,
}

impl BuildConfig {
    /// Parse a build config stream
    pub fn parse<R: Read>(reader: R) -> ConfigResult<Self> {
        Ok(Self {
            entries: parse_key_values(reader)?,
        })
    }

    /// All values of a key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of a key
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(String::as_str)
    }

    /// Root table content key as written
    pub fn root(&self) -> Option<&str> {
        self.get_first("root")
    }

    /// Encoding table content and encoding keys as written
    pub fn encoding(&self) -> Option<(&str, Option<&str>)> {
        let values = self.get("encoding")?;
        let ckey = values.first()?;
        Some((ckey.as_str(), values.get(1).map(String::as_str)))
    }

    /// Root table content key
    pub fn root_key(&self) -> ConfigResult<ContentKey> {
        let hex = self
            .root()
            .ok_or_else(|| ConfigError::MissingField("root".to_string()))?;
        parse_hash("root", hex, ContentKey::from_hex)
    }

    /// Encoding table content key and encoding key
    pub fn encoding_keys(&self) -> ConfigResult<(ContentKey, EncodingKey)> {
        let missing = || ConfigError::MissingField("encoding".to_string());
        let (ckey, ekey) = self.encoding().ok_or_else(missing)?;
        let ekey = ekey.ok_or_else(missing)?;
        Ok((
            parse_hash("encoding", ckey, ContentKey::from_hex)?,
            parse_hash("encoding", ekey, EncodingKey::from_hex)?,
        ))
    }

    /// Build name, e.g. `WOW-45745patch9.2.7_Retail`
    pub fn build_name(&self) -> Option<&str> {
        self.get_first("build-name")
    }

    /// Build number embedded in the build name
    ///
    /// The first run of at least three digits, extended to its full length.
    pub fn build_number(&self) -> Option<u32> {
        self.build_name().and_then(build_number_from_name)
    }
}

fn parse_hash<T, E>(field: &str, hex: &str, parse: impl Fn(&str) -> Result<T, E>) -> ConfigResult<T> {
    let hex = require_md5_hex(field, hex)?;
    parse(hex).map_err(|_| ConfigError::InvalidHash {
        field: field.to_string(),
        value: hex.to_string(),
    })
}

/// First run of three or more ASCII digits in `name`, parsed whole
pub fn build_number_from_name(name: &str) -> Option<u32> {
    let bytes = name.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if !bytes[start].is_ascii_digit() {
            start += 1;
            continue;
        }
        let end = bytes[start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |len| start + len);
        if end - start >= 3 {
            return name[start..end].parse().ok();
        }
        start = end;
    }
    None
}
