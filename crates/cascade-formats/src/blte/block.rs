//! Mode-tagged block dispatch

use cascade_crypto::KeyProvider;
use flate2::read::DeflateDecoder;
use std::io::Read;

use super::encryption::EncryptedBlock;
use super::error::{BlteError, BlteResult};

/// Maximum allowed output of a single deflate block (1 GiB)
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Block encoding, taken from the first byte of every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `N`: raw bytes
    Stored,
    /// `Z`: zlib stream
    Deflate,
    /// `E`: encrypted block wrapping another tagged block
    Encrypted,
    /// `F`: nested BLTE frame, not supported
    Frame,
}

impl BlockKind {
    /// Parse a mode tag
    pub fn from_tag(tag: u8) -> BlteResult<Self> {
        match tag {
            b'N' => Ok(Self::Stored),
            b'Z' => Ok(Self::Deflate),
            b'E' => Ok(Self::Encrypted),
            b'F' => Ok(Self::Frame),
            other => Err(BlteError::UnknownBlockType(other)),
        }
    }

    /// Mode tag byte
    pub const fn tag(self) -> u8 {
        match self {
            Self::Stored => b'N',
            Self::Deflate => b'Z',
            Self::Encrypted => b'E',
            Self::Frame => b'F',
        }
    }
}

/// Decode one tagged block, appending its output to `out`
///
/// `chunk_index` is the block's position in the chunk table; encrypted blocks
/// mix it into their nonce.
pub fn decode_block(
    block: &[u8],
    chunk_index: usize,
    keys: &dyn KeyProvider,
    out: &mut Vec<u8>,
) -> BlteResult<()> {
    let (&tag, body) = block.split_first().ok_or(BlteError::EmptyChunk)?;

    match BlockKind::from_tag(tag)? {
        BlockKind::Stored => {
            out.extend_from_slice(body);
            Ok(())
        }
        BlockKind::Deflate => inflate(block, out),
        BlockKind::Encrypted => {
            let encrypted = EncryptedBlock::parse(body)?;
            match encrypted.decrypt(keys, chunk_index)? {
                Some(inner) => decode_block(&inner, chunk_index, keys, out),
                None => Err(BlteError::KeyNotFound(encrypted.key_name)),
            }
        }
        BlockKind::Frame => Err(BlteError::UnsupportedFrame),
    }
}

/// Inflate a `Z` block: skip the tag and the 2-byte zlib header, then read a
/// raw deflate stream
fn inflate(block: &[u8], out: &mut Vec<u8>) -> BlteResult<()> {
    let stream = block.get(3..).ok_or(BlteError::Truncated {
        needed: 3,
        available: block.len(),
    })?;

    let mut decoder = DeflateDecoder::new(stream);
    let start = out.len();
    let mut buffer = [0u8; 8192];
    loop {
        let read = decoder
            .read(&mut buffer)
            .map_err(|e| BlteError::DecompressionFailed(e.to_string()))?;
        if read == 0 {
            break;
        }

        if out.len() - start + read > MAX_DECOMPRESSION_SIZE {
            return Err(BlteError::DecompressionFailed(format!(
                "decompressed size exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
            )));
        }
        out.extend_from_slice(&buffer[..read]);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blte::encryption::EncryptionSpec;
    use cascade_crypto::KeyStore;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn zlib_block(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(vec![b'Z'], Compression::default());
        encoder.write_all(data).expect("Operation should succeed");
        encoder.finish().expect("Operation should succeed")
    }

    fn decode(block: &[u8], keys: &dyn KeyProvider) -> BlteResult<Vec<u8>> {
        let mut out = Vec::new();
        decode_block(block, 0, keys, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_block_kind_tags() {
        for kind in [
            BlockKind::Stored,
            BlockKind::Deflate,
            BlockKind::Encrypted,
            BlockKind::Frame,
        ] {
            assert_eq!(BlockKind::from_tag(kind.tag()).expect("Operation should succeed"), kind);
        }
        assert!(matches!(
            BlockKind::from_tag(b'4'),
            Err(BlteError::UnknownBlockType(b'4'))
        ));
    }

    #[test]
    fn test_stored_block() {
        let out = decode(b"Nraw bytes", &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(out, b"raw bytes");
    }

    #[test]
    fn test_deflate_block() {
        let data = b"compressible compressible compressible compressible";
        let out = decode(&zlib_block(data), &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(out, data);
    }

    #[test]
    fn test_corrupt_deflate_block() {
        let result = decode(&[b'Z', 0x78, 0x9C, 0xFF, 0xFF, 0xFF], &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::DecompressionFailed(_))));
    }

    #[test]
    fn test_short_deflate_block() {
        let result = decode(&[b'Z', 0x78], &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::Truncated { .. })));
    }

    #[test]
    fn test_frame_block_fails() {
        let result = decode(b"Fnested", &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::UnsupportedFrame)));
    }

    #[test]
    fn test_empty_block() {
        let result = decode(&[], &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::EmptyChunk)));
    }

    #[test]
    fn test_encrypted_wrapping_deflate() {
        let key = [0x33u8; 16];
        let mut keys = KeyStore::empty();
        keys.set_key(0xAA, key);

        let inner = zlib_block(b"double wrapped");
        let block = EncryptionSpec::salsa20(0xAA, [1, 2, 3, 4]).encrypt(&inner, &key, 0);

        let out = decode(&block, &keys).expect("Operation should succeed");
        assert_eq!(out, b"double wrapped");
    }

    #[test]
    fn test_doubly_encrypted_block() {
        let key = [0x44u8; 16];
        let mut keys = KeyStore::empty();
        keys.set_key(0xBB, key);

        let spec = EncryptionSpec::salsa20(0xBB, [5, 6, 7, 8]);
        let once = spec.encrypt(b"Ninner", &key, 0);
        let twice = spec.encrypt(&once, &key, 0);

        let out = decode(&twice, &keys).expect("Operation should succeed");
        assert_eq!(out, b"inner");
    }

    #[test]
    fn test_encrypted_missing_key() {
        let block = EncryptionSpec::salsa20(0xCC, [0; 4]).encrypt(b"Nhidden", &[0x55; 16], 0);
        let result = decode(&block, &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::KeyNotFound(0xCC))));
    }
}
