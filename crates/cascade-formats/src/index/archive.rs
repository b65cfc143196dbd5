//! CDN archive index (`.index`) files
//!
//! Records are `{key: [u8; 16], size: u32 BE, offset: u32 BE}` packed into
//! 4 KiB pages. The record count sits in the footer, 12 bytes before the end
//! of the file. Page padding is 16 zero bytes, which readers step over by
//! re-reading the key once when it comes back all zero.

use binrw::{BinRead, BinReaderExt, BinWrite};
use cascade_crypto::EncodingKey;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

use super::{IndexEntry, IndexError, IndexResult};

/// Offset of the record count from the end of the file
pub const FOOTER_COUNT_OFFSET: i64 = 12;

/// One record of a CDN archive index
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct ArchiveIndexRecord {
    /// Full encoding key
    pub key: [u8; 16],
    /// Encoded size
    pub size: u32,
    /// Offset within the archive
    pub offset: u32,
}

/// Merged contents of one or more CDN archive indices
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: HashMap<[u8; 16], IndexEntry>,
}

impl ArchiveIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `.index` stream for the archive at `archive_index` in the CDN
    /// config archive list
    pub fn parse<R: Read + Seek>(reader: &mut R, archive_index: u32) -> IndexResult<Self> {
        let mut index = Self::new();
        index.read_from(reader, archive_index)?;
        Ok(index)
    }

    /// Read a `.index` file from disk
    pub fn from_path(path: impl AsRef<Path>, archive_index: u32) -> IndexResult<Self> {
        let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
        Self::parse(&mut file, archive_index)
    }

    /// Parse a `.index` stream into this index, keeping existing entries on
    /// duplicate keys. Returns the number of records read.
    pub fn read_from<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        archive_index: u32,
    ) -> IndexResult<usize> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < FOOTER_COUNT_OFFSET as u64 {
            return Err(IndexError::Truncated(format!(
                "{len} bytes is shorter than the footer"
            )));
        }

        reader.seek(SeekFrom::End(-FOOTER_COUNT_OFFSET))?;
        let count = reader.read_le::<u32>()? as usize;
        reader.seek(SeekFrom::Start(0))?;

        self.entries.reserve(count.min(1 << 20));
        for _ in 0..count {
            let mut key: [u8; 16] = reader.read_be()?;
            if key == [0; 16] {
                key = reader.read_be()?;
                if key == [0; 16] {
                    return Err(IndexError::Invalid(format!(
                        "zero key at offset {}",
                        reader.stream_position()? - 16
                    )));
                }
            }
            let size = reader.read_be::<u32>()?;
            let offset = reader.read_be::<u32>()?;

            if let Entry::Vacant(slot) = self.entries.entry(key) {
                slot.insert(IndexEntry {
                    archive_index,
                    offset,
                    size,
                });
            }
        }

        debug!(
            "parsed {} records from archive index {}",
            count, archive_index
        );
        Ok(count)
    }

    /// Merge another index; entries already present win
    pub fn merge(&mut self, other: Self) {
        for (key, entry) in other.entries {
            self.entries.entry(key).or_insert(entry);
        }
    }

    /// Look up a full encoding key
    pub fn get(&self, key: &[u8; 16]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Look up an encoding key
    pub fn get_ekey(&self, ekey: &EncodingKey) -> Option<&IndexEntry> {
        self.get(ekey.as_bytes())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&[u8; 16], &IndexEntry)> {
        self.entries.iter()
    }
}

/// Serialize records into a `.index` file body with page padding and footer
pub fn write_archive_index(records: &[ArchiveIndexRecord]) -> Vec<u8> {
    const PAGE_SIZE: usize = 4096;
    const RECORD_SIZE: usize = 24;

    let mut out = Vec::new();
    for record in records {
        let page_used = out.len() % PAGE_SIZE;
        if page_used + RECORD_SIZE > PAGE_SIZE {
            out.resize(out.len() + (PAGE_SIZE - page_used), 0);
        }
        out.extend_from_slice(&record.key);
        out.extend_from_slice(&record.size.to_be_bytes());
        out.extend_from_slice(&record.offset.to_be_bytes());
    }

    // Footer: toc hash, version, reserved, page size kb, offset/size/key bytes,
    // hash size, record count, footer hash
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&[1, 0, 0, 4, 4, 4, 16, 8]);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    out
}
