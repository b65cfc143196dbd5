//! Storage handler resolving names, IDs and content keys to file bytes

use cascade_crypto::{ContentKey, EncodingKey, KeyStore};
use cascade_formats::blte;
use cascade_formats::config::{BuildConfig, BuildInfo, CdnConfig};
use cascade_formats::encoding::EncodingFile;
use cascade_formats::index::{ArchiveIndex, IndexEntry, LocalIndex};
use cascade_formats::root::{ContentFlags, LocaleFlags, RootEntry, RootFile};
use parking_lot::RwLock;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::DiskCache;
use crate::cdn::CdnClient;
use crate::config::{Mode, StorageConfig};
use crate::error::{InitStage, Result, StorageError};
use crate::source::{ArchiveRef, DataSource, ResourceKind};

/// Read-only view of a CASC build
///
/// Construction loads configs, indices, the encoding table and the root table
/// in that order; any failure aborts it. Afterwards all tables are immutable
/// and reads may run concurrently from any number of threads.
pub struct CascHandler {
    config: StorageConfig,
    source: DataSource,
    keys: Arc<RwLock<KeyStore>>,
    build_config: BuildConfig,
    cdn_config: CdnConfig,
    archives: Vec<String>,
    local_index: LocalIndex,
    cdn_index: ArchiveIndex,
    encoding: EncodingFile,
    root: RootFile,
    locale: LocaleFlags,
    content: ContentFlags,
}

impl std::fmt::Debug for CascHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascHandler")
            .field("base_path", &self.config.base_path)
            .field("mode", &self.config.mode)
            .field("build", &self.build_config.build_name())
            .field("local_index", &self.local_index.len())
            .field("cdn_index", &self.cdn_index.len())
            .field("encoding", &self.encoding.len())
            .field("root", &self.root.len())
            .finish_non_exhaustive()
    }
}

struct BuildKeys {
    build_key: String,
    cdn_key: String,
    hosts: Vec<String>,
    path: Option<String>,
}

impl CascHandler {
    /// Open a build with the built-in key table
    pub fn open(config: StorageConfig) -> Result<Self> {
        Self::open_with_keys(config, KeyStore::new())
    }

    /// Open a build with a caller-supplied key store
    ///
    /// The configured key file, if any, is loaded into `keys` first.
    pub fn open_with_keys(config: StorageConfig, mut keys: KeyStore) -> Result<Self> {
        info!(
            "opening storage at {} ({:?} mode)",
            config.base_path.display(),
            config.mode
        );

        let locale: LocaleFlags = config
            .locale
            .parse()
            .map_err(StorageError::InvalidConfig)?;
        let content = ContentFlags::new(config.content_flags);

        if let Some(path) = &config.key_file {
            let loaded = keys.load_keys(path)?;
            info!("loaded {} keys from {}", loaded, path.display());
        }

        let build = resolve_build_keys(&config).map_err(StorageError::at(InitStage::Config))?;
        let source = open_source(&config, &build).map_err(StorageError::at(InitStage::Config))?;

        let (build_config, cdn_config) =
            load_configs(&source, &build).map_err(StorageError::at(InitStage::Config))?;
        info!(
            "loaded build config {} ({})",
            build.build_key,
            build_config.build_name().unwrap_or("unnamed build")
        );

        let archives: Vec<String> = cdn_config
            .validated_archives()
            .map_err(|e| StorageError::at(InitStage::Config)(e.into()))?
            .into_iter()
            .map(str::to_string)
            .collect();

        let (local_index, cdn_index) =
            load_indices(&source, &archives).map_err(StorageError::at(InitStage::Indexes))?;
        info!(
            "loaded {} local and {} CDN index entries",
            local_index.len(),
            cdn_index.len()
        );

        let mut handler = Self {
            config,
            source,
            keys: Arc::new(RwLock::new(keys)),
            build_config,
            cdn_config,
            archives,
            local_index,
            cdn_index,
            encoding: EncodingFile::default(),
            root: RootFile::default(),
            locale,
            content,
        };

        handler.encoding = handler
            .load_encoding()
            .map_err(StorageError::at(InitStage::Encoding))?;
        info!("loaded encoding table with {} entries", handler.encoding.len());

        handler.root = handler
            .load_root()
            .map_err(StorageError::at(InitStage::Root))?;
        info!(
            "loaded root table with {} entries for {} names",
            handler.root.len(),
            handler.root.name_count()
        );

        info!("storage ready");
        Ok(handler)
    }

    fn load_encoding(&self) -> Result<EncodingFile> {
        let (ckey, ekey) = self.build_config.encoding_keys()?;
        debug!("encoding table ckey {} ekey {}", ckey, ekey);
        let data = self.read_encoded(&[ekey])?;
        Ok(EncodingFile::parse(&data)?)
    }

    fn load_root(&self) -> Result<RootFile> {
        let ckey = self.build_config.root_key()?;
        let data = self.read_file_by_hash(&ckey)?;
        Ok(RootFile::parse(&data)?)
    }

    /// Read a file by path using the configured locale and content flags
    pub fn read_file_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .root_entry(Self::name_hash(name))
            .ok_or_else(|| StorageError::NotFound(format!("file name '{name}'")))?;
        self.read_file_by_hash(&entry.md5)
    }

    /// Read a file by file data ID using the configured locale and content flags
    pub fn read_file_by_id(&self, file_data_id: i32) -> Result<Vec<u8>> {
        let entry = self
            .root
            .get_entries_by_id(file_data_id, self.locale, self.content)
            .first()
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("file data ID {file_data_id}")))?;
        self.read_file_by_hash(&entry.md5)
    }

    /// Read a file by content key
    pub fn read_file_by_hash(&self, ckey: &ContentKey) -> Result<Vec<u8>> {
        let entry = self
            .encoding
            .get(ckey)
            .ok_or_else(|| StorageError::NotFound(format!("content key {ckey}")))?;
        self.read_encoded(&entry.keys)
    }

    /// Decode every file of the root table for a locale and content mask
    ///
    /// Files are yielded in root table order with the same narrowing as the
    /// single-file reads, so one name hash can appear once per surviving
    /// content variant. Each file is read only when the iterator reaches it.
    pub fn read_files(
        &self,
        locale: LocaleFlags,
        content: ContentFlags,
    ) -> impl Iterator<Item = (&RootEntry, Result<Vec<u8>>)> + '_ {
        self.root
            .resolve_all(locale, content)
            .map(move |(_, entry)| (entry, self.read_file_by_hash(&entry.md5)))
    }

    fn root_entry(&self, name_hash: u64) -> Option<&RootEntry> {
        self.root
            .get_entries(name_hash, self.locale, self.content)
            .first()
            .copied()
    }

    /// Locate and decode the first encoding key that any index knows
    ///
    /// Local indices are consulted before CDN indices. A key whose archive
    /// read fails softly gives way to the next key. Keys missing from every
    /// index are fetched as loose CDN files when the network is available.
    fn read_encoded(&self, ekeys: &[EncodingKey]) -> Result<Vec<u8>> {
        let mut last_error = None;
        for ekey in ekeys {
            let Some((archive, entry)) = self.locate(ekey)? else {
                continue;
            };
            let location = format!("{archive} at {:#x}", entry.offset);
            match self.source.open_data_range(archive, entry.offset, entry.size) {
                Ok(payload) => return self.decode(ekey, &location, &payload),
                Err(e) if e.is_soft() => {
                    warn!("failed to read {} from {}: {}", ekey, location, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(e) = last_error {
            return Err(e);
        }

        if self.source.is_online() {
            for ekey in ekeys {
                debug!("{} not in any index, trying loose CDN file", ekey);
                match self.source.open_loose(ekey) {
                    Ok(payload) => return self.decode(ekey, "loose CDN file", &payload),
                    Err(e) if e.is_soft() => last_error = Some(e),
                    Err(e) => return Err(e),
                }
            }
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Err(StorageError::NotFound(match ekeys.first() {
            Some(ekey) => format!("index entry for encoding key {ekey}"),
            None => "encoding keys".to_string(),
        }))
    }

    /// Archive and index entry holding `ekey`, local indices first
    fn locate(&self, ekey: &EncodingKey) -> Result<Option<(ArchiveRef<'_>, IndexEntry)>> {
        if let Some(entry) = usable(self.local_index.get_ekey(ekey)) {
            debug!(
                "{} in data.{:03} at {:#x} ({} bytes)",
                ekey, entry.archive_index, entry.offset, entry.size
            );
            return Ok(Some((ArchiveRef::Local(entry.archive_index), *entry)));
        }

        if let Some(entry) = usable(self.cdn_index.get_ekey(ekey)) {
            let archive = self
                .archives
                .get(entry.archive_index as usize)
                .ok_or_else(|| StorageError::InvalidEntry {
                    archive: entry.archive_index.to_string(),
                    reason: "archive index outside the CDN config archive list".to_string(),
                })?;
            debug!(
                "{} in archive {} at {:#x} ({} bytes)",
                ekey, archive, entry.offset, entry.size
            );
            return Ok(Some((ArchiveRef::Cdn(archive), *entry)));
        }

        Ok(None)
    }

    fn decode(&self, ekey: &EncodingKey, location: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.read();
        blte::decode(payload, &*keys).map_err(|e| {
            if e.is_soft() {
                warn!("failed to decode {} from {}: {}", ekey, location, e);
            }
            e.into()
        })
    }

    /// Build number parsed from the build config's `build-name`
    pub fn build_number(&self) -> Option<u32> {
        self.build_config.build_number()
    }

    /// Shared key store used for encrypted blocks
    pub fn keys(&self) -> &Arc<RwLock<KeyStore>> {
        &self.keys
    }

    /// Load a `name;key` file into the key store
    ///
    /// Keys become visible to subsequent reads, including reads on other
    /// threads.
    pub fn load_keys(&self, path: impl AsRef<Path>) -> Result<usize> {
        Ok(self.keys.write().load_keys(path)?)
    }

    /// Root name hash of a file path
    pub fn name_hash(path: &str) -> u64 {
        cascade_crypto::name_hash(path)
    }

    /// Parsed root table
    pub fn root(&self) -> &RootFile {
        &self.root
    }

    /// Parsed encoding table
    pub fn encoding(&self) -> &EncodingFile {
        &self.encoding
    }

    /// Parsed build config
    pub fn build_config(&self) -> &BuildConfig {
        &self.build_config
    }

    /// Parsed CDN config
    pub fn cdn_config(&self) -> &CdnConfig {
        &self.cdn_config
    }

    /// Configuration the handler was opened with
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Locale used by name and ID lookups
    pub fn locale(&self) -> LocaleFlags {
        self.locale
    }

    /// Content flags used by name and ID lookups
    pub fn content_flags(&self) -> ContentFlags {
        self.content
    }
}

fn usable(entry: Option<&IndexEntry>) -> Option<&IndexEntry> {
    entry.filter(|entry| entry.size != 0)
}

fn resolve_build_keys(config: &StorageConfig) -> Result<BuildKeys> {
    if let (Some(build_key), Some(cdn_key)) = (&config.build_key, &config.cdn_key) {
        return Ok(BuildKeys {
            build_key: build_key.to_ascii_lowercase(),
            cdn_key: cdn_key.to_ascii_lowercase(),
            hosts: Vec::new(),
            path: None,
        });
    }

    let info = BuildInfo::from_path(config.build_info_path())?;
    let active = info.active()?;
    debug!(
        "active build {} of {}",
        active.version().unwrap_or("?"),
        active.product().unwrap_or("?")
    );

    Ok(BuildKeys {
        build_key: active.build_key()?.to_ascii_lowercase(),
        cdn_key: active.cdn_key()?.to_ascii_lowercase(),
        hosts: active.cdn_hosts(),
        path: active.cdn_path().map(str::to_string),
    })
}

fn open_source(config: &StorageConfig, build: &BuildKeys) -> Result<DataSource> {
    match config.mode {
        Mode::Local => Ok(DataSource::local(&config.base_path)),
        Mode::Online => {
            let cache = DiskCache::open(&config.cache_dir, config.fast_validation)?;
            let cdn = CdnClient::from_config(config, build.hosts.clone(), build.path.as_deref())?;
            info!("using CDN hosts {:?}", cdn.hosts());
            Ok(DataSource::remote(Mode::Online, &config.base_path, cache, Some(cdn)))
        }
        Mode::Offline => {
            let cache = DiskCache::open(&config.cache_dir, config.fast_validation)?;
            Ok(DataSource::remote(Mode::Offline, &config.base_path, cache, None))
        }
    }
}

fn load_configs(source: &DataSource, build: &BuildKeys) -> Result<(BuildConfig, CdnConfig)> {
    let data = source.open_config_or_index(ResourceKind::Config, &build.build_key)?;
    let build_config = BuildConfig::parse(data.as_slice())?;

    let data = source.open_config_or_index(ResourceKind::Config, &build.cdn_key)?;
    let cdn_config = CdnConfig::parse(data.as_slice())?;

    Ok((build_config, cdn_config))
}

/// Load local `.idx` files and one `.index` per CDN archive
///
/// Archive indices that cannot be obtained are skipped with a warning;
/// indices that are present but malformed abort loading.
fn load_indices(source: &DataSource, archives: &[String]) -> Result<(LocalIndex, ArchiveIndex)> {
    let local_index = if source.mode() == Mode::Local {
        LocalIndex::discover(source.local_index_dir())?
    } else {
        LocalIndex::new()
    };

    let mut cdn_index = ArchiveIndex::new();
    for (position, archive) in archives.iter().enumerate() {
        let data = match source.open_config_or_index(ResourceKind::Index, archive) {
            Ok(data) => data,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("archive index {} is missing", archive);
                continue;
            }
            Err(e) if e.is_soft() => {
                warn!("archive index {} unavailable: {}", archive, e);
                continue;
            }
            Err(e) => return Err(e),
        };
        cdn_index.read_from(&mut Cursor::new(data), position as u32)?;
    }

    Ok((local_index, cdn_index))
}
