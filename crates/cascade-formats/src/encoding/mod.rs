//! Encoding table: content key to encoding keys
//!
//! The encoding table is itself a BLTE-wrapped file located through the
//! `encoding` entry of the build config. After decoding it maps the MD5 of a
//! file's content to the encoding keys of its stored copies:
//!
//! ```text
//! header (22 bytes, big-endian) | espec strings | page index (count × 32)
//! pages: { keyCount: u8 | size: u40 BE | ckey: 16 | keyCount × ekey: 16 }*
//!        zero padding to the end of the page
//! ```
//!
//! Only the content key pages are read; the encoding key pages that follow
//! are not needed to resolve files.

mod builder;
mod error;

pub use builder::EncodingBuilder;
pub use error::{EncodingError, EncodingResult};

use binrw::{BinRead, BinReaderExt, BinWrite};
use cascade_crypto::{ContentKey, EncodingKey};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{Cursor, Seek, SeekFrom};
use tracing::debug;

/// Encoding table magic
pub const ENCODING_MAGIC: [u8; 2] = *b"EN";

/// Size of one page index record (first key and page checksum)
pub const PAGE_INDEX_ENTRY_SIZE: u64 = 32;

/// Fixed-size encoding table header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct EncodingHeader {
    /// `EN`
    pub magic: [u8; 2],
    /// Format version
    pub version: u8,
    /// Content key size
    pub ckey_hash_size: u8,
    /// Encoding key size
    pub ekey_hash_size: u8,
    /// Content key page size in KiB
    pub ckey_page_size_kb: u16,
    /// Encoding key page size in KiB
    pub ekey_page_size_kb: u16,
    /// Number of content key pages
    pub ckey_page_count: u32,
    /// Number of encoding key pages
    pub ekey_page_count: u32,
    /// Reserved, zero
    pub flags: u8,
    /// Size of the espec string block
    pub espec_block_size: u32,
}

impl Default for EncodingHeader {
    fn default() -> Self {
        Self {
            magic: ENCODING_MAGIC,
            version: 1,
            ckey_hash_size: 16,
            ekey_hash_size: 16,
            ckey_page_size_kb: 4,
            ekey_page_size_kb: 4,
            ckey_page_count: 0,
            ekey_page_count: 0,
            flags: 0,
            espec_block_size: 0,
        }
    }
}

/// Encoded copies of one piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingEntry {
    /// Decoded file size
    pub size: u64,
    /// Encoding keys in on-disk order; the first resolvable one is used
    pub keys: Vec<EncodingKey>,
}

/// Parsed encoding table
#[derive(Debug, Clone, Default)]
pub struct EncodingFile {
    header: EncodingHeader,
    entries: HashMap<ContentKey, EncodingEntry>,
}

impl EncodingFile {
    /// Parse a decoded encoding table
    pub fn parse(data: &[u8]) -> EncodingResult<Self> {
        let len = data.len() as u64;
        let mut reader = Cursor::new(data);

        let header = EncodingHeader::read(&mut reader)?;
        if header.magic != ENCODING_MAGIC {
            return Err(EncodingError::InvalidMagic(header.magic));
        }

        reader.seek(SeekFrom::Current(i64::from(header.espec_block_size)))?;
        reader.seek(SeekFrom::Current(
            i64::from(header.ckey_page_count) * PAGE_INDEX_ENTRY_SIZE as i64,
        ))?;

        let page_size = u64::from(header.ckey_page_size_kb) * 1024;
        let mut entries = HashMap::new();
        let mut duplicates = 0usize;

        for _ in 0..header.ckey_page_count {
            let page_start = reader.position();
            if page_start >= len {
                break;
            }
            let page_end = if page_size == 0 {
                len
            } else {
                (page_start + page_size).min(len)
            };

            while reader.position() < page_end {
                let key_count: u8 = reader.read_be()?;
                if key_count == 0 {
                    break;
                }
                let (ckey, entry) = read_entry(&mut reader, key_count)?;
                match entries.entry(ckey) {
                    Entry::Vacant(slot) => {
                        slot.insert(entry);
                    }
                    Entry::Occupied(_) => duplicates += 1,
                }
            }

            skip_padding(&mut reader);
        }

        debug!(
            "parsed encoding table: {} entries, {} duplicates dropped",
            entries.len(),
            duplicates
        );
        Ok(Self { header, entries })
    }

    /// Table header
    pub fn header(&self) -> &EncodingHeader {
        &self.header
    }

    /// Look up the encoded copies of a content key
    pub fn get(&self, ckey: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(ckey)
    }

    /// Decoded size of a content key, zero when absent
    pub fn size_of(&self, ckey: &ContentKey) -> u64 {
        self.get(ckey).map_or(0, |entry| entry.size)
    }

    /// Number of content keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&ContentKey, &EncodingEntry)> {
        self.entries.iter()
    }
}

fn read_entry(
    reader: &mut Cursor<&[u8]>,
    key_count: u8,
) -> EncodingResult<(ContentKey, EncodingEntry)> {
    let size_high: u8 = reader.read_be()?;
    let size_low: u32 = reader.read_be()?;
    let size = (u64::from(size_high) << 32) | u64::from(size_low);

    let ckey: ContentKey = reader.read_be()?;
    let mut keys = Vec::with_capacity(usize::from(key_count));
    for _ in 0..key_count {
        keys.push(reader.read_be::<EncodingKey>()?);
    }

    Ok((ckey, EncodingEntry { size, keys }))
}

/// Step over zero bytes, stopping on the first non-zero byte or the end
fn skip_padding(reader: &mut Cursor<&[u8]>) {
    let data = *reader.get_ref();
    let mut pos = reader.position() as usize;
    while data.get(pos) == Some(&0) {
        pos += 1;
    }
    reader.set_position(pos as u64);
}
