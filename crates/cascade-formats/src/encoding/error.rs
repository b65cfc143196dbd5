//! Error types for encoding table parsing

use thiserror::Error;

/// Errors that can occur when parsing an encoding table
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Magic is not `EN`
    #[error("invalid encoding magic: expected 'EN', got {0:?}")]
    InvalidMagic([u8; 2]),

    /// Table ended inside the header or an entry
    #[error("truncated encoding table: {0}")]
    Truncated(String),

    /// Structurally invalid table
    #[error("invalid encoding table: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for EncodingError {
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

/// Result type for encoding operations
pub type EncodingResult<T> = Result<T, EncodingError>;
