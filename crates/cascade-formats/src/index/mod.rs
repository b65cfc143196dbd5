//! Index files mapping encoding keys to archive locations
//!
//! Two layouts are supported:
//!
//! - [`LocalIndex`]: the bucketed `.idx` files of a local installation
//!   (`Data/data/*.idx`), keyed by the first 9 bytes of the encoding key.
//! - [`ArchiveIndex`]: the CDN `.index` files (`Data/indices/*.index`), keyed by
//!   the full 16-byte encoding key.
//!
//! Both resolve a key to an [`IndexEntry`]. When a key appears more than once
//! the first occurrence wins, both within a file and when merging files.

mod archive;
mod local;

pub use archive::{ArchiveIndex, ArchiveIndexRecord, FOOTER_COUNT_OFFSET, write_archive_index};
pub use local::{
    BUCKET_COUNT, LOCAL_RECORD_SIZE, LocalIndex, LocalIndexRecord, discover_local_indices,
    write_local_index,
};

use thiserror::Error;

/// Location of an encoded blob inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// Archive number (`data.NNN` locally, position in the CDN archive list remotely)
    pub archive_index: u32,
    /// Byte offset within the archive
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Index parsing errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File ended before the declared data
    #[error("truncated index: {0}")]
    Truncated(String),

    /// Structurally invalid index
    #[error("invalid index: {0}")]
    Invalid(String),
}

impl From<binrw::Error> for IndexError {
    fn from(err: binrw::Error) -> Self {
        if err.is_eof() {
            return Self::Truncated(err.to_string());
        }
        match err {
            binrw::Error::Io(e) => Self::Io(e),
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
