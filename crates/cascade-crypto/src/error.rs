//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during key handling and decryption
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Key not found
    #[error("Encryption key not found: {0:016X}")]
    KeyNotFound(u64),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Key file could not be read
    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),
}
