//! Encrypted (`E`) block handling
//!
//! Layout after the `E` mode byte:
//!
//! | Field         | Size            |
//! |---------------|-----------------|
//! | key name size | 1 (always 8)    |
//! | key name      | 8, little-endian|
//! | IV size       | 1 (at most 16)  |
//! | IV            | IV size         |
//! | cipher        | 1 (`S` or `A`)  |
//! | payload       | rest            |

use std::io::Cursor;

use binrw::{BinRead, binread};
use cascade_crypto::salsa20::{Salsa20Cipher, block_nonce};
use cascade_crypto::{KEY_SIZE, KeyProvider};
use tracing::debug;

use super::error::{BlteError, BlteResult};

/// Maximum IV length accepted in an encrypted block header
pub const MAX_IV_SIZE: usize = 16;

/// Cipher named by an encrypted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// Salsa20 (`S`)
    Salsa20,
    /// ARC4 (`A`), recognized but not supported
    Arc4,
}

impl Cipher {
    /// Parse a cipher tag
    pub fn from_tag(tag: u8) -> BlteResult<Self> {
        match tag {
            b'S' => Ok(Self::Salsa20),
            b'A' => Ok(Self::Arc4),
            other => Err(BlteError::UnknownCipher(other)),
        }
    }

    /// Tag byte written in block headers
    pub const fn tag(self) -> u8 {
        match self {
            Self::Salsa20 => b'S',
            Self::Arc4 => b'A',
        }
    }
}

/// Encrypted block header, read little-endian after the `E` tag
#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct EncryptedHeader {
    #[br(temp, assert(
        key_name_size == 8,
        BlteError::InvalidEncryptedBlock(format!("key name size {key_name_size}, expected 8"))
    ))]
    key_name_size: u8,
    key_name: u64,
    #[br(temp, assert(
        usize::from(iv_size) <= MAX_IV_SIZE,
        BlteError::InvalidEncryptedBlock(format!("IV size {iv_size} exceeds {MAX_IV_SIZE}"))
    ))]
    iv_size: u8,
    #[br(count = iv_size)]
    iv: Vec<u8>,
    #[br(try_map = |tag: u8| Cipher::from_tag(tag))]
    cipher: Cipher,
}

/// Parsed encrypted block, borrowing its payload
#[derive(Debug, Clone)]
pub struct EncryptedBlock<'a> {
    /// Name of the key needed to decrypt
    pub key_name: u64,
    /// Raw IV as stored
    pub iv: Vec<u8>,
    /// Cipher used
    pub cipher: Cipher,
    /// Encrypted bytes
    pub payload: &'a [u8],
}

impl<'a> EncryptedBlock<'a> {
    /// Parse an encrypted block body (the bytes after the `E` tag)
    pub fn parse(body: &'a [u8]) -> BlteResult<Self> {
        let mut cursor = Cursor::new(body);
        let header = EncryptedHeader::read(&mut cursor)
            .map_err(|err| BlteError::from_binrw(err, body.len()))?;

        let payload = body.get(cursor.position() as usize..).unwrap_or_default();
        Ok(Self {
            key_name: header.key_name,
            iv: header.iv,
            cipher: header.cipher,
            payload,
        })
    }

    /// Decrypt the payload for the chunk at `chunk_index`
    ///
    /// Returns `Ok(None)` when `keys` has no key for [`Self::key_name`]; the
    /// block simply yields no data.
    pub fn decrypt(&self, keys: &dyn KeyProvider, chunk_index: usize) -> BlteResult<Option<Vec<u8>>> {
        if self.cipher == Cipher::Arc4 {
            return Err(BlteError::UnsupportedCipher(Cipher::Arc4.tag()));
        }

        let Some(key) = keys.get_key(self.key_name) else {
            debug!(
                "no key {:016X} for encrypted chunk {}",
                self.key_name, chunk_index
            );
            return Ok(None);
        };

        let nonce = block_nonce(&self.iv, chunk_index);
        let mut plain = self.payload.to_vec();
        Salsa20Cipher::new(&key, &nonce).apply_keystream(&mut plain);
        Ok(Some(plain))
    }
}

/// Parameters for producing an encrypted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionSpec {
    /// Key name written into the block
    pub key_name: u64,
    /// 4-byte IV written into the block
    pub iv: [u8; 4],
}

impl EncryptionSpec {
    /// Salsa20 parameters for `key_name` with a 4-byte IV
    pub const fn salsa20(key_name: u64, iv: [u8; 4]) -> Self {
        Self { key_name, iv }
    }

    /// Encrypt a mode-tagged `block` and wrap it in an `E` block
    pub fn encrypt(&self, block: &[u8], key: &[u8; KEY_SIZE], chunk_index: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(block.len() + 16);
        out.push(b'E');
        out.push(8);
        out.extend_from_slice(&self.key_name.to_le_bytes());
        out.push(self.iv.len() as u8);
        out.extend_from_slice(&self.iv);
        out.push(Cipher::Salsa20.tag());

        let start = out.len();
        out.extend_from_slice(block);
        let nonce = block_nonce(&self.iv, chunk_index);
        Salsa20Cipher::new(key, &nonce).apply_keystream(&mut out[start..]);
        out
    }
}
