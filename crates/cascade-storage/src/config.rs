//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StorageError};
use crate::retry::RetryPolicy;

/// Where data comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Everything from the local installation under `base_path`
    #[default]
    Local,
    /// Configs, indices and archives from the CDN, cached under `cache_dir`
    Online,
    /// Like online, but served from the cache only
    Offline,
}

impl Mode {
    /// Whether this mode may issue network requests
    pub const fn allows_network(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Configuration for [`CascHandler`](crate::CascHandler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Installation directory holding `.build.info` and `Data/`
    pub base_path: PathBuf,

    /// Data source mode
    pub mode: Mode,

    /// CDN hosts tried in order; `.build.info` hosts are used when empty
    pub cdn_hosts: Vec<String>,

    /// CDN path prefix such as `tpr/wow`; from `.build.info` when unset
    pub cdn_path: Option<String>,

    /// URL scheme for CDN requests
    pub cdn_scheme: String,

    /// Cache directory for CDN downloads
    pub cache_dir: PathBuf,

    /// Check only sizes of cached files, not their MD5
    pub fast_validation: bool,

    /// Retry policy for CDN requests
    pub retry: RetryPolicy,

    /// Optional `name;key` file loaded into the key store at open
    pub key_file: Option<PathBuf>,

    /// Locale name used by the extraction CLI
    pub locale: String,

    /// Content flags used by the extraction CLI
    pub content_flags: u32,

    /// Timeout for a single HTTP request
    pub request_timeout: Duration,

    /// Build config key overriding `.build.info`
    pub build_key: Option<String>,

    /// CDN config key overriding `.build.info`
    pub cdn_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            mode: Mode::Local,
            cdn_hosts: Vec::new(),
            cdn_path: None,
            cdn_scheme: "http".to_string(),
            cache_dir: PathBuf::from("cache"),
            fast_validation: false,
            retry: RetryPolicy::default(),
            key_file: None,
            locale: "enUS".to_string(),
            content_flags: 0,
            request_timeout: Duration::from_secs(30),
            build_key: None,
            cdn_key: None,
        }
    }
}

impl StorageConfig {
    /// Configuration for a local installation
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| {
            StorageError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })
    }

    /// Set the data source mode
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the CDN hosts
    #[must_use]
    pub fn with_cdn_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cdn_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the CDN path prefix
    #[must_use]
    pub fn with_cdn_path(mut self, path: impl Into<String>) -> Self {
        self.cdn_path = Some(path.into());
        self
    }

    /// Set the URL scheme
    #[must_use]
    pub fn with_cdn_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.cdn_scheme = scheme.into();
        self
    }

    /// Set the cache directory
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Enable or disable size-only cache validation
    #[must_use]
    pub fn with_fast_validation(mut self, fast: bool) -> Self {
        self.fast_validation = fast;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the key file
    #[must_use]
    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Set the locale name
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the content flags
    #[must_use]
    pub fn with_content_flags(mut self, flags: u32) -> Self {
        self.content_flags = flags;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Pin the build and CDN config keys
    #[must_use]
    pub fn with_build(mut self, build_key: impl Into<String>, cdn_key: impl Into<String>) -> Self {
        self.build_key = Some(build_key.into());
        self.cdn_key = Some(cdn_key.into());
        self
    }

    /// Path of `.build.info`
    pub fn build_info_path(&self) -> PathBuf {
        self.base_path.join(".build.info")
    }

    /// Path of the `Data` directory
    pub fn data_root(&self) -> PathBuf {
        self.base_path.join("Data")
    }
}
