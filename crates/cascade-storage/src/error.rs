//! Error types for storage access

use cascade_crypto::CryptoError;
use cascade_formats::blte::BlteError;
use cascade_formats::config::ConfigError;
use cascade_formats::encoding::EncodingError;
use cascade_formats::index::IndexError;
use cascade_formats::root::RootError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Handler initialization stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Reading `.build.info`, the build config and the CDN config
    Config,
    /// Loading local and CDN indices
    Indexes,
    /// Decoding the encoding table
    Encoding,
    /// Decoding the root table
    Root,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "configuration",
            Self::Indexes => "indices",
            Self::Encoding => "encoding table",
            Self::Root => "root table",
        })
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Handler construction failed
    #[error("failed to load {stage}: {source}")]
    Init {
        /// Stage that failed
        stage: InitStage,
        /// Underlying error
        source: Box<StorageError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Index file error
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Encoding table error
    #[error("encoding table error: {0}")]
    Encoding(#[from] EncodingError),

    /// Root table error
    #[error("root table error: {0}")]
    Root(#[from] RootError),

    /// BLTE decode error
    #[error("BLTE error: {0}")]
    Blte(#[from] BlteError),

    /// Key store error
    #[error("key error: {0}")]
    Crypto(#[from] CryptoError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid storage configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Name, ID or key not present in the loaded tables
    #[error("not found: {0}")]
    NotFound(String),

    /// Every CDN host failed or kept answering 404/429
    #[error("{resource} unavailable: {reason}")]
    Unavailable {
        /// Requested path
        resource: String,
        /// Last failure
        reason: String,
    },

    /// Resource requires the network but the source does not use it
    #[error("{0} requires network access")]
    Offline(String),

    /// Downloaded or cached data failed validation
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Resource name
        name: String,
        /// Expected MD5
        expected: String,
        /// Actual MD5
        actual: String,
    },

    /// Index entry too small to hold an archive record
    #[error("invalid index entry for archive {archive}: {reason}")]
    InvalidEntry {
        /// Archive number or name
        archive: String,
        /// What is wrong
        reason: String,
    },
}

impl StorageError {
    /// Whether the error only affects one file
    ///
    /// Soft errors leave the handler usable; callers extracting many files log
    /// them and continue.
    pub fn is_soft(&self) -> bool {
        match self {
            Self::Blte(err) => err.is_soft(),
            Self::Crypto(err) => matches!(err, CryptoError::KeyNotFound(_)),
            Self::NotFound(_)
            | Self::Unavailable { .. }
            | Self::Offline(_)
            | Self::ChecksumMismatch { .. }
            | Self::InvalidEntry { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn at(stage: InitStage) -> impl FnOnce(Self) -> Self {
        move |err| Self::Init {
            stage,
            source: Box::new(err),
        }
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
