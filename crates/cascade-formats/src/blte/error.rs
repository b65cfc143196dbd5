//! BLTE error types

use thiserror::Error;

/// BLTE-specific error type
///
/// Every variant describes a failure of one file's decode; none of them leave
/// shared state behind, so callers can log and move on to the next file.
#[derive(Debug, Error)]
pub enum BlteError {
    /// Invalid BLTE magic bytes
    #[error("invalid BLTE magic: expected [42 4C 54 45], got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Declared sizes run past the end of the payload
    #[error("truncated BLTE data: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the structure asked for; a short binrw read reports one past `available`
        needed: usize,
        /// Bytes left in the payload
        available: usize,
    },

    /// Chunk table does not account for the whole payload
    #[error("chunk table covers {declared} bytes but payload has {actual}")]
    SizeMismatch {
        /// Sum of declared compressed sizes
        declared: usize,
        /// Payload bytes after the header
        actual: usize,
    },

    /// Chunk with no mode byte
    #[error("empty chunk (zero size)")]
    EmptyChunk,

    /// Unknown block mode tag
    #[error("unknown block type: 0x{0:02X}")]
    UnknownBlockType(u8),

    /// Nested frame blocks (`F`) are not supported
    #[error("unsupported block type: frame (F)")]
    UnsupportedFrame,

    /// Cipher recognized but not supported (ARC4)
    #[error("unsupported cipher: 0x{0:02X}")]
    UnsupportedCipher(u8),

    /// Cipher tag not recognized
    #[error("unknown cipher: 0x{0:02X}")]
    UnknownCipher(u8),

    /// Structure that binrw could not read
    #[error("invalid BLTE structure: {0}")]
    InvalidStructure(String),

    /// Malformed encrypted block header
    #[error("invalid encrypted block: {0}")]
    InvalidEncryptedBlock(String),

    /// Encryption key not found
    #[error("encryption key not found: {0:016X}")]
    KeyNotFound(u64),

    /// Deflate stream could not be inflated
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlteError {
    /// Whether the error only affects the file being decoded
    ///
    /// I/O failures are the only hard errors; everything else stems from the
    /// payload itself.
    pub const fn is_soft(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    /// Map a binrw failure while reading from a buffer with `available` bytes
    ///
    /// Errors raised by the BLTE readers themselves come back unchanged; a
    /// short read becomes [`Self::Truncated`].
    pub(crate) fn from_binrw(err: binrw::Error, available: usize) -> Self {
        if err.is_eof() {
            return Self::Truncated {
                needed: available + 1,
                available,
            };
        }
        match err {
            binrw::Error::Custom { err, .. } => match err.downcast::<Self>() {
                Ok(blte) => *blte,
                Err(other) => Self::InvalidStructure(other.to_string()),
            },
            binrw::Error::Backtrace(bt) => Self::from_binrw(*bt.error, available),
            binrw::Error::Io(e) => Self::Io(e),
            other => Self::InvalidStructure(other.to_string()),
        }
    }
}

/// Result type for BLTE operations
pub type BlteResult<T> = Result<T, BlteError>;
