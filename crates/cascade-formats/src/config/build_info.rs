//! `.build.info` (BPSV) parsing
//!
//! ```text
//! Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|...
//! ## seqn = 1234
//! us|1|0123...|4567...|...
//! ```
//!
//! The header names each column with its type after `!`. Lines starting with
//! `#` are comments.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

use super::{ConfigError, ConfigResult, require_md5_hex};

/// Parsed `.build.info` table
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// One row of a [`BuildInfo`] table
#[derive(Debug, Clone, Copy)]
pub struct BuildInfoEntry<'a> {
    info: &'a BuildInfo,
    row: &'a [String],
}

impl BuildInfo {
    /// Parse a `.build.info` stream
    pub fn parse<R: Read>(reader: R) -> ConfigResult<Self> {
        let mut lines = BufReader::new(reader).lines();

        let header = loop {
            match lines.next() {
                None => return Err(ConfigError::Empty),
                Some(line) => {
                    let line = line?;
                    let line = line.trim();
                    if !line.is_empty() && !line.starts_with('#') {
                        break line.to_string();
                    }
                }
            }
        };

        let columns = header
            .split('|')
            .map(|field| {
                field
                    .split_once('!')
                    .map(|(name, _)| name.trim().to_string())
                    .ok_or_else(|| {
                        ConfigError::InvalidHeader(format!("column '{field}' has no type"))
                    })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut rows = Vec::new();
        for line in lines {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let row: Vec<String> = line.split('|').map(String::from).collect();
            if row.len() != columns.len() {
                return Err(ConfigError::RowLength {
                    row: rows.len(),
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            rows.push(row);
        }

        debug!(
            "parsed .build.info: {} columns, {} rows",
            columns.len(),
            rows.len()
        );
        Ok(Self { columns, rows })
    }

    /// Read `.build.info` from disk
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::parse(std::fs::File::open(path)?)
    }

    /// Column names in header order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows
    pub fn entries(&self) -> impl Iterator<Item = BuildInfoEntry<'_>> {
        self.rows.iter().map(|row| BuildInfoEntry { info: self, row })
    }

    /// The row whose `Active` column is `1`
    ///
    /// Tables without an `Active` column use their first row.
    pub fn active(&self) -> ConfigResult<BuildInfoEntry<'_>> {
        let Some(active) = self.column_index("Active") else {
            return self.entries().next().ok_or(ConfigError::NoActiveBuild);
        };
        self.entries()
            .find(|entry| entry.row[active].trim() == "1")
            .ok_or(ConfigError::NoActiveBuild)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }
}

impl<'a> BuildInfoEntry<'a> {
    /// Value of a column, if present and non-empty
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.info.column_index(column)?;
        let value = self.row[index].trim();
        (!value.is_empty()).then_some(value)
    }

    fn require(&self, column: &str) -> ConfigResult<&'a str> {
        self.get(column)
            .ok_or_else(|| ConfigError::MissingField(column.to_string()))
    }

    /// Build config key
    pub fn build_key(&self) -> ConfigResult<&'a str> {
        require_md5_hex("Build Key", self.require("Build Key")?)
    }

    /// CDN config key
    pub fn cdn_key(&self) -> ConfigResult<&'a str> {
        require_md5_hex("CDN Key", self.require("CDN Key")?)
    }

    /// CDN path prefix, e.g. `tpr/wow`
    pub fn cdn_path(&self) -> Option<&'a str> {
        self.get("CDN Path")
    }

    /// Space-separated CDN host names
    pub fn cdn_hosts(&self) -> Vec<String> {
        self.get("CDN Hosts")
            .map(|hosts| hosts.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Client version string
    pub fn version(&self) -> Option<&'a str> {
        self.get("Version")
    }

    /// Product code
    pub fn product(&self) -> Option<&'a str> {
        self.get("Product")
    }

    /// Branch (region)
    pub fn branch(&self) -> Option<&'a str> {
        self.get("Branch")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const BUILD_INFO: &str = "\
Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|CDN Path!STRING:0|CDN Hosts!STRING:0|Version!STRING:0|Product!STRING:0
## seqn = 42
eu|0|00000000000000000000000000000000|11111111111111111111111111111111|tpr/wow|eu.cdn.example|1.0.0.1|wow
us|1|aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa|bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb|tpr/wow|us.cdn.example level3.example|9.2.7.45745|wow
";

    #[test]
    fn test_active_row() {
        let info = BuildInfo::parse(BUILD_INFO.as_bytes()).expect("Operation should succeed");
        assert_eq!(info.len(), 2);

        let active = info.active().expect("Operation should succeed");
        assert_eq!(active.branch(), Some("us"));
        assert_eq!(
            active.build_key().expect("Operation should succeed"),
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(
            active.cdn_key().expect("Operation should succeed"),
            "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
        );
        assert_eq!(active.cdn_path(), Some("tpr/wow"));
        assert_eq!(active.cdn_hosts(), vec!["us.cdn.example", "level3.example"]);
        assert_eq!(active.version(), Some("9.2.7.45745"));
    }

    #[test]
    fn test_no_active_row() {
        let text = "Active!DEC:1|Build Key!HEX:16\n0|aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n";
        let info = BuildInfo::parse(text.as_bytes()).expect("Operation should succeed");
        assert!(matches!(info.active(), Err(ConfigError::NoActiveBuild)));
    }

    #[test]
    fn test_short_build_key() {
        let text = "Active!DEC:1|Build Key!HEX:16\n1|abcd\n";
        let info = BuildInfo::parse(text.as_bytes()).expect("Operation should succeed");
        let active = info.active().expect("Operation should succeed");
        assert!(matches!(
            active.build_key(),
            Err(ConfigError::InvalidHash { .. })
        ));
    }

    #[test]
    fn test_missing_column() {
        let text = "Active!DEC:1|Build Key!HEX:16\n1|aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n";
        let info = BuildInfo::parse(text.as_bytes()).expect("Operation should succeed");
        let active = info.active().expect("Operation should succeed");
        assert!(matches!(active.cdn_key(), Err(ConfigError::MissingField(_))));
        assert!(active.cdn_hosts().is_empty());
    }

    #[test]
    fn test_invalid_header_and_rows() {
        assert!(matches!(
            BuildInfo::parse("Active|Build Key\n".as_bytes()),
            Err(ConfigError::InvalidHeader(_))
        ));
        assert!(matches!(
            BuildInfo::parse("A!DEC:1|B!DEC:1\n1\n".as_bytes()),
            Err(ConfigError::RowLength {
                row: 0,
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            BuildInfo::parse("".as_bytes()),
            Err(ConfigError::Empty)
        ));
    }
}
