//! BLTE (Block Table Encoded) container decoding
//!
//! Every content-addressed payload in a CASC archive is wrapped in BLTE:
//!
//! ```text
//! "BLTE" | frameHeaderLength: u32 BE | [flags: u8 | chunkCount: u24 BE | chunk table]
//!        | chunk 0 | chunk 1 | ...
//! ```
//!
//! Each chunk starts with a mode byte (`N` stored, `Z` zlib, `E` encrypted,
//! `F` nested frame). Chunks are decoded in table order and concatenated.
//!
//! # Example
//!
//! ```
//! use cascade_crypto::KeyStore;
//! use cascade_formats::blte::{self, BlteBuilder};
//!
//! let payload = BlteBuilder::new()
//!     .add_stored(b"AB")
//!     .add_deflate(b"CD")?
//!     .add_stored(b"EF")
//!     .build();
//!
//! let data = blte::decode(&payload, &KeyStore::empty())?;
//! assert_eq!(data, b"ABCDEF");
//! # Ok::<(), cascade_formats::blte::BlteError>(())
//! ```

mod block;
mod builder;
mod encryption;
mod error;
mod header;

pub use block::{BlockKind, MAX_DECOMPRESSION_SIZE, decode_block};
pub use builder::BlteBuilder;
pub use encryption::{Cipher, EncryptedBlock, EncryptionSpec, MAX_IV_SIZE};
pub use error::{BlteError, BlteResult};
pub use header::{BLTE_MAGIC, BlteHeader, CHUNK_INFO_SIZE, ChunkInfo};

use std::io::Cursor;

use cascade_crypto::KeyProvider;
use tracing::warn;

const PREALLOC_LIMIT: usize = 64 * 1024 * 1024;

/// Decode a complete BLTE payload
///
/// `payload` starts at the `BLTE` magic and ends with the last chunk. Keys for
/// encrypted chunks come from `keys`; a missing key fails this decode with
/// [`BlteError::KeyNotFound`] and has no effect on any other decode.
pub fn decode(payload: &[u8], keys: &dyn KeyProvider) -> BlteResult<Vec<u8>> {
    let mut cursor = Cursor::new(payload);
    let header = BlteHeader::parse(&mut cursor)?;

    let mut pos = cursor.position() as usize;
    let declared = header.total_compressed_size();
    let available = payload.len() - pos;
    if declared > available {
        return Err(BlteError::Truncated {
            needed: declared,
            available,
        });
    }
    if declared != available {
        return Err(BlteError::SizeMismatch {
            declared,
            actual: available,
        });
    }

    // Declared sizes are untrusted until decoded
    let mut out = Vec::with_capacity(header.total_decompressed_size().min(PREALLOC_LIMIT));
    for (index, chunk) in header.chunks.iter().enumerate() {
        let end = pos + chunk.compressed_size as usize;
        let block = payload.get(pos..end).ok_or(BlteError::Truncated {
            needed: end - pos,
            available: payload.len() - pos,
        })?;
        pos = end;
        let start = out.len();
        decode_block(block, index, keys, &mut out)?;

        let produced = out.len() - start;
        if produced != chunk.decompressed_size as usize {
            warn!(
                "chunk {} decoded to {} bytes, header declares {}",
                index, produced, chunk.decompressed_size
            );
        }
    }

    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cascade_crypto::KeyStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_three_chunk_mixed_payload() {
        let payload = BlteBuilder::new()
            .add_stored(b"AB")
            .add_deflate(b"CD")
            .expect("Operation should succeed")
            .add_stored(b"EF")
            .build();

        let data = decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(data, b"ABCDEF");
    }

    #[test]
    fn test_header_length_is_not_validated() {
        // Hand-built payload declaring a header length of 13
        let mut zlib = flate2::write::ZlibEncoder::new(vec![b'Z'], flate2::Compression::fast());
        std::io::Write::write_all(&mut zlib, b"CD").expect("Operation should succeed");
        let z_block = zlib.finish().expect("Operation should succeed");
        let blocks: [&[u8]; 3] = [b"NAB", &z_block, b"NEF"];

        let mut payload = b"BLTE".to_vec();
        payload.extend_from_slice(&13u32.to_be_bytes());
        payload.push(0x0F);
        payload.extend_from_slice(&[0, 0, 3]);
        for block in blocks {
            payload.extend_from_slice(&(block.len() as u32).to_be_bytes());
            payload.extend_from_slice(&2u32.to_be_bytes());
            payload.extend_from_slice(&[0; 16]);
        }
        for block in blocks {
            payload.extend_from_slice(block);
        }

        let data = decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(data, b"ABCDEF");
    }

    #[test]
    fn test_single_chunk_payload() {
        let payload = BlteBuilder::new()
            .add_stored(b"only chunk")
            .build_single()
            .expect("One block was added");

        let data = decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(data, b"only chunk");
    }

    #[test]
    fn test_single_chunk_deflate() {
        let text = b"single chunk deflate payload".repeat(20);
        let payload = BlteBuilder::new()
            .add_deflate(&text)
            .expect("Operation should succeed")
            .build_single()
            .expect("One block was added");

        let data = decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        assert_eq!(data, text);
    }

    #[test]
    fn test_build_single_requires_one_block() {
        assert!(BlteBuilder::new().build_single().is_none());
        assert!(
            BlteBuilder::new()
                .add_stored(b"a")
                .add_stored(b"b")
                .build_single()
                .is_none()
        );
    }

    #[test]
    fn test_truncated_chunk_data() {
        let mut payload = BlteBuilder::new().add_stored(b"ABCDEF").build();
        payload.truncate(payload.len() - 3);

        let result = decode(&payload, &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::Truncated { .. })));
    }

    #[test]
    fn test_trailing_bytes_mismatch() {
        let mut payload = BlteBuilder::new().add_stored(b"ABCDEF").build();
        payload.extend_from_slice(b"junk");

        let result = decode(&payload, &KeyStore::empty());
        assert!(matches!(
            result,
            Err(BlteError::SizeMismatch {
                declared: 7,
                actual: 11
            })
        ));
    }

    #[test]
    fn test_chunk_count_larger_than_table() {
        let mut payload = b"BLTE".to_vec();
        payload.extend_from_slice(&36u32.to_be_bytes());
        payload.push(0x0F);
        payload.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        payload.extend_from_slice(b"NAB");

        let result = decode(&payload, &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::Truncated { .. })));
    }

    #[test]
    fn test_invalid_magic() {
        let result = decode(b"XXXX\0\0\0\0Nabc", &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::InvalidMagic(_))));
    }

    #[test]
    fn test_unknown_block_type_reports_byte() {
        let payload = BlteBuilder::new()
            .add_stored(b"ok")
            .add_raw_block(b"Qbad".to_vec(), 3)
            .build();

        let result = decode(&payload, &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::UnknownBlockType(b'Q'))));
    }

    #[test]
    fn test_frame_block_fails_whole_decode() {
        let payload = BlteBuilder::new()
            .add_stored(b"ok")
            .add_raw_block(b"Fframe".to_vec(), 5)
            .build();

        let result = decode(&payload, &KeyStore::empty());
        assert!(matches!(result, Err(BlteError::UnsupportedFrame)));
    }

    #[test]
    fn test_encrypted_chunks_use_chunk_index() {
        let key = [0x77u8; 16];
        let mut keys = KeyStore::empty();
        keys.set_key(0xFEED, key);
        let spec = EncryptionSpec::salsa20(0xFEED, [0xDE, 0xAD, 0xBE, 0xEF]);

        let payload = BlteBuilder::new()
            .add_stored(b"plain-")
            .add_encrypted(spec, &key, BlockKind::Stored, b"secret-")
            .expect("Operation should succeed")
            .add_encrypted(spec, &key, BlockKind::Deflate, b"compressed secret")
            .expect("Operation should succeed")
            .build();

        let data = decode(&payload, &keys).expect("Operation should succeed");
        assert_eq!(data, b"plain-secret-compressed secret");
    }

    #[test]
    fn test_missing_key_fails_only_that_decode() {
        let key = [0x21u8; 16];
        let spec = EncryptionSpec::salsa20(0xDEAD_BEEF, [1, 1, 1, 1]);
        let locked = BlteBuilder::new()
            .add_encrypted(spec, &key, BlockKind::Stored, b"locked")
            .expect("Operation should succeed")
            .build();
        let open = BlteBuilder::new().add_stored(b"open").build();

        let keys = KeyStore::empty();
        assert!(matches!(
            decode(&locked, &keys),
            Err(BlteError::KeyNotFound(0xDEAD_BEEF))
        ));
        assert_eq!(decode(&open, &keys).expect("Operation should succeed"), b"open");
    }

    #[test]
    fn test_empty_multi_chunk_payload() {
        let payload = BlteBuilder::new().build();
        let data = decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        assert!(data.is_empty());
    }
}
