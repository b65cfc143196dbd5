//! BLTE header and chunk table

use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{BinRead, BinResult};

use super::error::{BlteError, BlteResult};

/// BLTE magic bytes
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// Size of one chunk table descriptor
pub const CHUNK_INFO_SIZE: usize = 24;

/// One entry of the chunk table
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(big)]
pub struct ChunkInfo {
    /// Encoded size including the mode byte
    pub compressed_size: u32,
    /// Size after decoding
    pub decompressed_size: u32,
    /// MD5 of the encoded chunk (not verified during decode)
    pub checksum: [u8; 16],
}

/// Parsed BLTE header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlteHeader {
    /// Raw `frameHeaderLength`; zero means one implicit chunk
    pub header_size: u32,
    /// Chunk flags byte (multi-chunk only)
    pub flags: u8,
    /// Chunks in table order
    pub chunks: Vec<ChunkInfo>,
}

/// Bytes between the stream position and the end of the stream
fn remaining<R: Seek>(reader: &mut R) -> BinResult<usize> {
    let pos = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos) as usize)
}

/// Fail with [`BlteError::Truncated`] unless `needed` bytes are left
fn require<R: Seek>(reader: &mut R, needed: usize) -> BinResult<()> {
    let available = remaining(reader)?;
    if needed > available {
        return Err(binrw::Error::Custom {
            pos: reader.stream_position()?,
            err: Box::new(BlteError::Truncated { needed, available }),
        });
    }
    Ok(())
}

impl BinRead for BlteHeader {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        require(reader, 8)?;
        let magic = <[u8; 4]>::read_options(reader, binrw::Endian::Big, ())?;
        if magic != BLTE_MAGIC {
            return Err(binrw::Error::Custom {
                pos: 0,
                err: Box::new(BlteError::InvalidMagic(magic)),
            });
        }

        let header_size = u32::read_options(reader, binrw::Endian::Big, ())?;
        if header_size == 0 {
            // The mode byte counts towards the encoded size but not the output
            let remaining = remaining(reader)? as u32;
            return Ok(Self {
                header_size,
                flags: 0,
                chunks: vec![ChunkInfo {
                    compressed_size: remaining,
                    decompressed_size: remaining.saturating_sub(1),
                    checksum: [0; 16],
                }],
            });
        }

        require(reader, 4)?;
        let flags = u8::read_options(reader, binrw::Endian::Big, ())?;
        let count = <[u8; 3]>::read_options(reader, binrw::Endian::Big, ())?;
        let chunk_count = u32::from_be_bytes([0, count[0], count[1], count[2]]) as usize;

        require(reader, chunk_count * CHUNK_INFO_SIZE)?;
        let mut chunks = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            chunks.push(ChunkInfo::read_options(reader, binrw::Endian::Big, ())?);
        }

        Ok(Self {
            header_size,
            flags,
            chunks,
        })
    }
}

impl BlteHeader {
    /// Parse the header, leaving `cursor` at the first chunk
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> BlteResult<Self> {
        let available = cursor
            .get_ref()
            .len()
            .saturating_sub(cursor.position() as usize);
        Self::read_be(cursor).map_err(|err| BlteError::from_binrw(err, available))
    }

    /// Whether this is the implicit single-chunk layout
    pub const fn is_single_chunk(&self) -> bool {
        self.header_size == 0
    }

    /// Sum of declared compressed sizes
    pub fn total_compressed_size(&self) -> usize {
        self.chunks.iter().map(|c| c.compressed_size as usize).sum()
    }

    /// Sum of declared decompressed sizes
    pub fn total_decompressed_size(&self) -> usize {
        self.chunks.iter().map(|c| c.decompressed_size as usize).sum()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_header() {
        let data: &[u8] = b"BLTE\0\0\0\0Nhello";
        let mut cursor = Cursor::new(data);
        let header = BlteHeader::parse(&mut cursor).expect("Operation should succeed");

        assert!(header.is_single_chunk());
        assert_eq!(header.chunks.len(), 1);
        assert_eq!(header.chunks[0].compressed_size, 6);
        assert_eq!(header.chunks[0].decompressed_size, 5);
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn test_multi_chunk_header() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&60u32.to_be_bytes());
        data.push(0x0F);
        data.extend_from_slice(&[0, 0, 2]);
        for (c, d) in [(3u32, 2u32), (5, 4)] {
            data.extend_from_slice(&c.to_be_bytes());
            data.extend_from_slice(&d.to_be_bytes());
            data.extend_from_slice(&[0xAA; 16]);
        }

        let mut cursor = Cursor::new(data.as_slice());
        let header = BlteHeader::parse(&mut cursor).expect("Operation should succeed");

        assert_eq!(header.header_size, 60);
        assert_eq!(header.flags, 0x0F);
        assert_eq!(header.chunks.len(), 2);
        assert_eq!(header.total_compressed_size(), 8);
        assert_eq!(header.total_decompressed_size(), 6);
        assert_eq!(header.chunks[1].checksum, [0xAA; 16]);
        assert_eq!(cursor.position() as usize, data.len());
    }

    #[test]
    fn test_invalid_magic() {
        let data: &[u8] = b"BLTF\0\0\0\0N";
        let result = BlteHeader::parse(&mut Cursor::new(data));
        assert!(matches!(result, Err(BlteError::InvalidMagic(m)) if &m == b"BLTF"));
    }

    #[test]
    fn test_chunk_table_overrun() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&36u32.to_be_bytes());
        data.push(0x0F);
        data.extend_from_slice(&[0, 0, 5]);
        data.extend_from_slice(&[0; 24]);

        let result = BlteHeader::parse(&mut Cursor::new(data.as_slice()));
        assert!(matches!(
            result,
            Err(BlteError::Truncated {
                needed: 120,
                available: 24
            })
        ));
    }

    #[test]
    fn test_short_preamble() {
        let data: &[u8] = b"BLTE\0\0";
        let result = BlteHeader::parse(&mut Cursor::new(data));
        assert!(matches!(
            result,
            Err(BlteError::Truncated {
                needed: 8,
                available: 6
            })
        ));
    }

    #[test]
    fn test_missing_chunk_count() {
        let mut data = b"BLTE".to_vec();
        data.extend_from_slice(&36u32.to_be_bytes());
        data.push(0x0F);

        let result = BlteHeader::parse(&mut Cursor::new(data.as_slice()));
        assert!(matches!(
            result,
            Err(BlteError::Truncated {
                needed: 4,
                available: 1
            })
        ));
    }
}
