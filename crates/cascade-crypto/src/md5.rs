//! MD5-based content and encoding keys

use binrw::{BinRead, BinWrite};
use md5::{Digest, Md5};
use std::fmt;

use crate::error::CryptoError;

/// Length of a truncated encoding key as stored in local `.idx` files
pub const TRUNCATED_KEY_SIZE: usize = 9;

fn digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hasher.finalize());
    bytes
}

fn parse_hex_key(hex: &str) -> Result<[u8; 16], CryptoError> {
    let hex = hex.trim();
    if hex.len() != 32 {
        return Err(CryptoError::InvalidKeySize {
            expected: 16,
            actual: hex.len() / 2,
        });
    }
    let mut bytes = [0u8; 16];
    hex::decode_to_slice(hex, &mut bytes)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;
    Ok(bytes)
}

/// Content key: MD5 of the decoded file contents
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey([u8; 16]);

impl ContentKey {
    /// Create a content key from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Compute the content key of `data`
    pub fn from_data(data: &[u8]) -> Self {
        Self(digest(data))
    }

    /// Parse a content key from 32 hex characters
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        parse_hex_key(hex).map(Self)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Encoding key: MD5 of the BLTE-encoded bytes, used for index lookups
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodingKey([u8; 16]);

impl EncodingKey {
    /// Create an encoding key from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Compute the encoding key of encoded `data`
    pub fn from_data(data: &[u8]) -> Self {
        Self(digest(data))
    }

    /// Parse an encoding key from 32 hex characters
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        parse_hex_key(hex).map(Self)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 9 bytes, the key form used by local `.idx` files
    pub fn truncated(&self) -> [u8; TRUNCATED_KEY_SIZE] {
        let mut key = [0u8; TRUNCATED_KEY_SIZE];
        key.copy_from_slice(&self.0[..TRUNCATED_KEY_SIZE]);
        key
    }
}

impl fmt::Display for EncodingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
