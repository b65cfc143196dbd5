//! Local bucket index (`.idx`) files
//!
//! ```text
//! headerHashSize: u32 LE | headerHash: u32 LE | header ... | pad to 16
//! dataLength: u32 LE | dataHash: u32 LE
//! dataLength / 18 records
//! ```
//!
//! Records are 18 bytes of mixed endianness: a 9-byte truncated key, one byte
//! holding the high bits of the archive number, a big-endian u32 packing the
//! two low archive bits above a 30-bit offset, and a little-endian size.

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian};
use cascade_crypto::EncodingKey;
use cascade_crypto::md5::TRUNCATED_KEY_SIZE;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{IndexEntry, IndexResult};

/// Size of one record in bytes
pub const LOCAL_RECORD_SIZE: u32 = 18;

/// Number of local index buckets (`00` through `0f`)
pub const BUCKET_COUNT: u8 = 16;

const OFFSET_MASK: u32 = 0x3FFF_FFFF;

fn parse_location<R: Read + Seek>(
    reader: &mut R,
    _endian: Endian,
    _args: (),
) -> BinResult<(u32, u32)> {
    let high = u32::from(reader.read_be::<u8>()?);
    let packed = reader.read_be::<u32>()?;

    let archive_index = (high << 2) | ((packed >> 30) & 0x3);
    Ok((archive_index, packed & OFFSET_MASK))
}

fn write_location<W: Write + Seek>(
    location: &(u32, u32),
    writer: &mut W,
    _endian: Endian,
    _args: (),
) -> BinResult<()> {
    let (archive_index, offset) = *location;
    let high = u8::try_from(archive_index >> 2).map_err(|e| binrw::Error::AssertFail {
        pos: 0,
        message: format!("archive index {archive_index} too large: {e}"),
    })?;

    writer.write_be(&high)?;
    writer.write_be(&(((archive_index & 0x3) << 30) | (offset & OFFSET_MASK)))?;
    Ok(())
}

/// One 18-byte `.idx` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct LocalIndexRecord {
    /// First 9 bytes of the encoding key
    pub key: [u8; TRUNCATED_KEY_SIZE],

    /// `(archive_index, offset)`
    #[br(parse_with = parse_location)]
    #[bw(write_with = write_location)]
    pub location: (u32, u32),

    /// Size including the 30-byte archive entry header
    #[brw(little)]
    pub size: u32,
}

impl LocalIndexRecord {
    /// Build a record
    pub const fn new(key: [u8; TRUNCATED_KEY_SIZE], archive_index: u32, offset: u32, size: u32) -> Self {
        Self {
            key,
            location: (archive_index, offset),
            size,
        }
    }

    /// Convert into a lookup entry
    pub const fn entry(&self) -> IndexEntry {
        IndexEntry {
            archive_index: self.location.0,
            offset: self.location.1,
            size: self.size,
        }
    }
}

/// Merged contents of one or more `.idx` files
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: HashMap<[u8; TRUNCATED_KEY_SIZE], IndexEntry>,
}

impl LocalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `.idx` stream
    pub fn parse<R: Read + Seek>(reader: &mut R) -> IndexResult<Self> {
        let mut index = Self::new();
        index.read_from(reader)?;
        Ok(index)
    }

    /// Read an `.idx` file from disk
    pub fn from_path(path: impl AsRef<Path>) -> IndexResult<Self> {
        let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
        Self::parse(&mut file)
    }

    /// Parse an `.idx` stream into this index, keeping existing entries on
    /// duplicate keys. Returns the number of records read.
    pub fn read_from<R: Read + Seek>(&mut self, reader: &mut R) -> IndexResult<usize> {
        let header_size = reader.read_le::<u32>()?;
        let _header_hash = reader.read_le::<u32>()?;

        let data_start = (8 + u64::from(header_size) + 15) & !15;
        reader.seek(SeekFrom::Start(data_start))?;

        let data_length = reader.read_le::<u32>()?;
        let _data_hash = reader.read_le::<u32>()?;

        let count = (data_length / LOCAL_RECORD_SIZE) as usize;
        self.entries.reserve(count.min(1 << 20));

        for _ in 0..count {
            let record = LocalIndexRecord::read(reader)?;
            if let Entry::Vacant(slot) = self.entries.entry(record.key) {
                slot.insert(record.entry());
            }
        }

        debug!("parsed {} local index records", count);
        Ok(count)
    }

    /// Load and merge the newest `.idx` file of every bucket in `data_dir`
    pub fn discover(data_dir: impl AsRef<Path>) -> IndexResult<Self> {
        let mut index = Self::new();
        for path in discover_local_indices(data_dir)? {
            let mut file = std::io::BufReader::new(std::fs::File::open(&path)?);
            index.read_from(&mut file)?;
        }
        Ok(index)
    }

    /// Merge another index; entries already present win
    pub fn merge(&mut self, other: Self) {
        for (key, entry) in other.entries {
            self.entries.entry(key).or_insert(entry);
        }
    }

    /// Look up a truncated key
    pub fn get(&self, key: &[u8; TRUNCATED_KEY_SIZE]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Look up an encoding key by its first 9 bytes
    pub fn get_ekey(&self, ekey: &EncodingKey) -> Option<&IndexEntry> {
        self.get(&ekey.truncated())
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
    pub fn iter(&self) -> impl Iterator<Item = (&[u8; TRUNCATED_KEY_SIZE], &IndexEntry)> {
        self.entries.iter()
    }
}

/// Write a complete `.idx` file containing `records`
pub fn write_local_index<W: Write + Seek>(
    writer: &mut W,
    bucket: u8,
    records: &[LocalIndexRecord],
) -> BinResult<()> {
    // 16-byte header: version, bucket, field sizes, segment size
    let header: [u8; 16] = [
        0x07, 0x00, 0x00, bucket, 0x00, 0x04, 0x05, 0x09, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00,
        0x00, 0x00,
    ];
    writer.write_le(&(header.len() as u32))?;
    writer.write_le(&0u32)?;
    writer.write_all(&header)?;
    // 8 + 16 is already 16-aligned

    writer.write_le(&(records.len() as u32 * LOCAL_RECORD_SIZE))?;
    writer.write_le(&0u32)?;
    for record in records {
        record.write(writer)?;
    }
    Ok(())
}

/// Pick the `.idx` files to load from `data_dir`
///
/// Files are named `{bucket:02x}{version:08x}.idx`; for each of the 16
/// buckets the last file by sorted name wins. The result is ordered by bucket.
pub fn discover_local_indices(data_dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut names: Vec<String> = std::fs::read_dir(data_dir.as_ref())?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("idx"))
        })
        .collect();
    names.sort();

    let mut selected = Vec::new();
    for bucket in 0..BUCKET_COUNT {
        let prefix = format!("{bucket:02x}");
        if let Some(name) = names
            .iter()
            .rev()
            .find(|name| name.to_ascii_lowercase().starts_with(&prefix))
        {
            selected.push(data_dir.as_ref().join(name));
        }
    }

    Ok(selected)
}
