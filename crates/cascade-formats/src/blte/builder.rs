//! BLTE container builder
//!
//! Produces BLTE payloads from stored, deflated and encrypted blocks. Used to
//! create fixtures and to re-encode extracted content.

use cascade_crypto::KEY_SIZE;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

use super::block::BlockKind;
use super::encryption::EncryptionSpec;
use super::error::BlteResult;
use super::header::{BLTE_MAGIC, CHUNK_INFO_SIZE};

/// Builder for BLTE payloads
#[derive(Debug, Default, Clone)]
pub struct BlteBuilder {
    blocks: Vec<(Vec<u8>, u32)>,
}

impl BlteBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `N` block
    #[must_use]
    pub fn add_stored(mut self, data: &[u8]) -> Self {
        let block = encode_block(BlockKind::Stored, data);
        self.blocks.push((block, data.len() as u32));
        self
    }

    /// Append a `Z` block
    pub fn add_deflate(mut self, data: &[u8]) -> BlteResult<Self> {
        let block = deflate_block(data)?;
        self.blocks.push((block, data.len() as u32));
        Ok(self)
    }

    /// Append an `E` block wrapping `data` encoded as `inner`
    ///
    /// `inner` must be [`BlockKind::Stored`] or [`BlockKind::Deflate`].
    pub fn add_encrypted(
        mut self,
        spec: EncryptionSpec,
        key: &[u8; KEY_SIZE],
        inner: BlockKind,
        data: &[u8],
    ) -> BlteResult<Self> {
        let inner_block = match inner {
            BlockKind::Deflate => deflate_block(data)?,
            _ => encode_block(BlockKind::Stored, data),
        };
        let block = spec.encrypt(&inner_block, key, self.blocks.len());
        self.blocks.push((block, data.len() as u32));
        Ok(self)
    }

    /// Append an already tagged block with its declared decoded size
    #[must_use]
    pub fn add_raw_block(mut self, block: Vec<u8>, decompressed_size: u32) -> Self {
        self.blocks.push((block, decompressed_size));
        self
    }

    /// Build with a chunk table
    pub fn build(&self) -> Vec<u8> {
        let header_size = 8 + 4 + self.blocks.len() * CHUNK_INFO_SIZE;
        let body_size: usize = self.blocks.iter().map(|(b, _)| b.len()).sum();

        let mut out = Vec::with_capacity(header_size + body_size);
        out.extend_from_slice(&BLTE_MAGIC);
        out.extend_from_slice(&(header_size as u32).to_be_bytes());
        out.push(0x0F);
        out.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes()[1..]);

        for (block, decompressed_size) in &self.blocks {
            out.extend_from_slice(&(block.len() as u32).to_be_bytes());
            out.extend_from_slice(&decompressed_size.to_be_bytes());
            out.extend_from_slice(&md5::compute(block).0);
        }

        for (block, _) in &self.blocks {
            out.extend_from_slice(block);
        }
        out
    }

    /// Build without a chunk table (`frameHeaderLength == 0`)
    ///
    /// Returns `None` unless exactly one block was added.
    pub fn build_single(&self) -> Option<Vec<u8>> {
        let [(block, _)] = self.blocks.as_slice() else {
            return None;
        };

        let mut out = Vec::with_capacity(8 + block.len());
        out.extend_from_slice(&BLTE_MAGIC);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(block);
        Some(out)
    }
}

fn encode_block(kind: BlockKind, data: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(data.len() + 1);
    block.push(kind.tag());
    block.extend_from_slice(data);
    block
}

fn deflate_block(data: &[u8]) -> BlteResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(vec![BlockKind::Deflate.tag()], Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
