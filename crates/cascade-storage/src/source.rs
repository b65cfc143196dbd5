//! Raw byte access to archives, configs and indices
//!
//! A [`DataSource`] hides where bytes come from. In [`Mode::Local`] everything
//! is read from the installation's `Data` directory. In [`Mode::Online`]
//! requests go to the disk cache first and then to the CDN, and downloads are
//! cached. [`Mode::Offline`] serves the cache only.

use cascade_crypto::EncodingKey;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cache::{CacheLookup, DiskCache};
use crate::cdn::{CdnClient, CdnKind};
use crate::config::Mode;
use crate::error::{Result, StorageError};

/// Size of the per-entry header preceding each BLTE payload in `data.NNN`
pub const LOCAL_ENTRY_HEADER_SIZE: u32 = 30;

/// Archive an index entry points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveRef<'a> {
    /// Local `data.NNN`
    Local(u32),
    /// CDN archive by name
    Cdn(&'a str),
}

impl fmt::Display for ArchiveRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(index) => write!(f, "data.{index:03}"),
            Self::Cdn(name) => write!(f, "archive {name}"),
        }
    }
}

/// Kind of small keyed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Build or CDN config, stored under `config/ab/cd/<key>`
    Config,
    /// CDN archive index, stored as `<key>.index`
    Index,
}

/// Byte source for a storage handler
#[derive(Debug)]
pub struct DataSource {
    mode: Mode,
    data_root: PathBuf,
    cache: Option<DiskCache>,
    cdn: Option<CdnClient>,
}

impl DataSource {
    /// Source reading a local installation at `base_path`
    pub fn local(base_path: impl AsRef<Path>) -> Self {
        Self {
            mode: Mode::Local,
            data_root: base_path.as_ref().join("Data"),
            cache: None,
            cdn: None,
        }
    }

    /// Source backed by the CDN and a disk cache
    ///
    /// `cdn` is ignored in offline mode.
    pub fn remote(
        mode: Mode,
        base_path: impl AsRef<Path>,
        cache: DiskCache,
        cdn: Option<CdnClient>,
    ) -> Self {
        Self {
            mode,
            data_root: base_path.as_ref().join("Data"),
            cache: Some(cache),
            cdn: cdn.filter(|_| mode.allows_network()),
        }
    }

    /// Data source mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether requests may reach the network
    pub fn is_online(&self) -> bool {
        self.cdn.is_some()
    }

    /// Local `data.NNN` path
    pub fn archive_path(&self, archive_index: u32) -> PathBuf {
        self.data_root
            .join("data")
            .join(format!("data.{archive_index:03}"))
    }

    /// Local config path, `Data/config/ab/cd/<key>`
    pub fn config_path(&self, key: &str) -> Option<PathBuf> {
        let (ab, cd) = (key.get(0..2)?, key.get(2..4)?);
        Some(self.data_root.join("config").join(ab).join(cd).join(key))
    }

    /// Local CDN index path, `Data/indices/<key>.index`
    pub fn index_path(&self, key: &str) -> PathBuf {
        self.data_root.join("indices").join(format!("{key}.index"))
    }

    /// Directory holding the local `.idx` files
    pub fn local_index_dir(&self) -> PathBuf {
        self.data_root.join("data")
    }

    /// Read the BLTE payload of an index entry
    ///
    /// Local entries skip the 30-byte entry header, so the payload is bytes
    /// `[offset + 30, offset + size)` of the archive. CDN entries are fetched
    /// as a range request of `size` bytes at `offset`.
    pub fn open_data_range(&self, archive: ArchiveRef<'_>, offset: u32, size: u32) -> Result<Vec<u8>> {
        match archive {
            ArchiveRef::Local(index) => self.read_local_range(index, offset, size),
            ArchiveRef::Cdn(name) if self.mode == Mode::Local => {
                Err(StorageError::Offline(format!("CDN archive {name}")))
            }
            ArchiveRef::Cdn(name) => {
                let cache_name = format!("{name}.{offset:x}-{size:x}");
                self.cached(&cache_name, None, |cdn| {
                    cdn.fetch_range(CdnKind::Data, name, u64::from(offset), u64::from(size))
                })
            }
        }
    }

    /// Read a config file or CDN archive index by key
    ///
    /// Configs fetched from the network are checked against their key, since
    /// config keys are the MD5 of the file.
    pub fn open_config_or_index(&self, kind: ResourceKind, key: &str) -> Result<Vec<u8>> {
        if self.mode == Mode::Local {
            let path = match kind {
                ResourceKind::Config => self.config_path(key).ok_or_else(|| {
                    StorageError::InvalidConfig(format!("invalid config key '{key}'"))
                })?,
                ResourceKind::Index => self.index_path(key),
            };
            debug!("reading {}", path.display());
            return Ok(std::fs::read(path)?);
        }

        match kind {
            ResourceKind::Config => {
                self.cached(key, Some(key), |cdn| cdn.fetch(CdnKind::Config, key))
            }
            ResourceKind::Index => {
                let name = format!("{key}.index");
                self.cached(&name, None, |cdn| cdn.fetch(CdnKind::Data, &name))
            }
        }
    }

    /// Fetch a loose CDN file stored under its encoding key
    pub fn open_loose(&self, ekey: &EncodingKey) -> Result<Vec<u8>> {
        let name = ekey.to_hex();
        if self.mode == Mode::Local {
            return Err(StorageError::NotFound(format!("encoding key {name}")));
        }
        self.cached(&name, None, |cdn| cdn.fetch(CdnKind::Data, &name))
    }

    fn read_local_range(&self, archive_index: u32, offset: u32, size: u32) -> Result<Vec<u8>> {
        let invalid = |reason: String| StorageError::InvalidEntry {
            archive: format!("data.{archive_index:03}"),
            reason,
        };
        if size < LOCAL_ENTRY_HEADER_SIZE {
            return Err(invalid(format!(
                "size {size} is smaller than the entry header"
            )));
        }

        let mut file = match File::open(self.archive_path(archive_index)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(invalid("archive file is missing".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(
            u64::from(offset) + u64::from(LOCAL_ENTRY_HEADER_SIZE),
        ))?;

        let mut payload = vec![0u8; (size - LOCAL_ENTRY_HEADER_SIZE) as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => Ok(payload),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(invalid(format!(
                "entry at {offset:#x} with size {size} extends past the end of the archive"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Cache lookup, then CDN fetch with one re-fetch on validation failure
    fn cached<F>(&self, name: &str, expected_md5: Option<&str>, fetch: F) -> Result<Vec<u8>>
    where
        F: Fn(&CdnClient) -> Result<Vec<u8>>,
    {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| StorageError::InvalidConfig("no cache configured".to_string()))?;

        match cache.get(name)? {
            CacheLookup::Hit(data) => return Ok(data),
            CacheLookup::Miss => {}
            CacheLookup::Purged => debug!("re-fetching purged cache entry {}", name),
        }

        let Some(cdn) = &self.cdn else {
            return Err(StorageError::Offline(name.to_string()));
        };

        let mut attempts_left = 2;
        loop {
            attempts_left -= 1;
            let data = fetch(cdn)?;

            if let Some(expected) = expected_md5 {
                let actual = hex::encode(md5::compute(&data).0);
                if !actual.eq_ignore_ascii_case(expected) {
                    if attempts_left > 0 {
                        warn!("{} failed checksum validation, re-fetching", name);
                        continue;
                    }
                    return Err(StorageError::ChecksumMismatch {
                        name: name.to_string(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }

            if let Err(e) = cache.insert(name, &data) {
                warn!("failed to cache {}: {}", name, e);
            }
            return Ok(data);
        }
    }
}
