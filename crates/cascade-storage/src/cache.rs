//! Disk cache for CDN downloads
//!
//! Files live directly under the cache directory. `cache.meta` records one
//! `<name> <size> <md5hex>` line per file; lines are appended on insert and
//! the file is rewritten when an entry is removed. Later lines override
//! earlier ones when the log is reloaded.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};

/// Name of the metadata log inside the cache directory
pub const META_FILE: &str = "cache.meta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheMeta {
    size: u64,
    md5: [u8; 16],
}

/// Outcome of a cache lookup
#[derive(Debug, PartialEq, Eq)]
pub enum CacheLookup {
    /// Valid cached data
    Hit(Vec<u8>),
    /// Nothing cached under this name
    Miss,
    /// A cached file failed validation and was removed
    Purged,
}

/// Validated file cache
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    fast_validation: bool,
    meta: Mutex<HashMap<String, CacheMeta>>,
}

impl DiskCache {
    /// Open or create a cache directory and load its metadata
    pub fn open(dir: impl Into<PathBuf>, fast_validation: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let meta = match fs::read_to_string(dir.join(META_FILE)) {
            Ok(text) => parse_meta(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("opened cache {} with {} entries", dir.display(), meta.len());

        Ok(Self {
            dir,
            fast_validation,
            meta: Mutex::new(meta),
        })
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.meta.lock().len()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.meta.lock().is_empty()
    }

    /// Whether `name` has a metadata record
    pub fn contains(&self, name: &str) -> bool {
        self.meta.lock().contains_key(name)
    }

    /// Read and validate a cached file
    ///
    /// The size is always checked; the MD5 is checked unless fast validation
    /// is enabled. Invalid files are removed and reported as
    /// [`CacheLookup::Purged`].
    pub fn get(&self, name: &str) -> Result<CacheLookup> {
        check_name(name)?;
        let Some(meta) = self.meta.lock().get(name).copied() else {
            return Ok(CacheLookup::Miss);
        };

        let data = match fs::read(self.dir.join(name)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("cache file {} is missing", name);
                self.remove(name)?;
                return Ok(CacheLookup::Purged);
            }
            Err(e) => return Err(e.into()),
        };

        let valid = data.len() as u64 == meta.size
            && (self.fast_validation || md5::compute(&data).0 == meta.md5);
        if !valid {
            warn!("cache file {} failed validation, purging", name);
            self.remove(name)?;
            return Ok(CacheLookup::Purged);
        }

        Ok(CacheLookup::Hit(data))
    }

    /// Store `data` under `name`
    pub fn insert(&self, name: &str, data: &[u8]) -> Result<()> {
        check_name(name)?;
        let meta = CacheMeta {
            size: data.len() as u64,
            md5: md5::compute(data).0,
        };

        let mut map = self.meta.lock();
        fs::write(self.dir.join(name), data)?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(META_FILE))?;
        writeln!(log, "{}", format_line(name, &meta))?;

        map.insert(name.to_string(), meta);
        Ok(())
    }

    /// Remove `name` and rewrite the metadata log
    pub fn remove(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let mut map = self.meta.lock();

        match fs::remove_file(self.dir.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if map.remove(name).is_some() {
            let mut names: Vec<_> = map.keys().collect();
            names.sort();
            let mut text = String::new();
            for key in names {
                text.push_str(&format_line(key, &map[key]));
                text.push('\n');
            }
            fs::write(self.dir.join(META_FILE), text)?;
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != META_FILE
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidConfig(format!(
            "invalid cache entry name '{name}'"
        )))
    }
}

fn format_line(name: &str, meta: &CacheMeta) -> String {
    format!("{} {} {}", name, meta.size, hex::encode(meta.md5))
}

fn parse_meta(text: &str) -> HashMap<String, CacheMeta> {
    let mut map = HashMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = parse_meta_line(line);

        match parsed {
            Some((name, meta)) => {
                map.insert(name, meta);
            }
            None => warn!("skipping malformed {} line {}", META_FILE, number + 1),
        }
    }
    map
}

fn parse_meta_line(line: &str) -> Option<(String, CacheMeta)> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    let size = fields.next()?.parse().ok()?;
    let md5 = <[u8; 16]>::try_from(hex::decode(fields.next()?).ok()?).ok()?;
    fields
        .next()
        .is_none()
        .then(|| (name.to_string(), CacheMeta { size, md5 }))
}
