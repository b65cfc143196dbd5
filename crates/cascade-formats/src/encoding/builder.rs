//! Encoding table builder
//!
//! Lays content key entries out in fixed-size pages with a page index, the
//! way the parser expects them. Encoding key pages are not written.

use binrw::BinWrite;
use cascade_crypto::{ContentKey, EncodingKey};
use std::io::Cursor;

use super::{EncodingEntry, EncodingHeader};

const DEFAULT_ESPEC: &[u8] = b"z\0";

/// Builder for decoded encoding tables
#[derive(Debug, Clone)]
pub struct EncodingBuilder {
    entries: Vec<(ContentKey, EncodingEntry)>,
    page_size_kb: u16,
}

impl Default for EncodingBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            page_size_kb: 4,
        }
    }
}

impl EncodingBuilder {
    /// Create an empty builder with 4 KiB pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content key page size
    #[must_use]
    pub fn with_page_size_kb(mut self, page_size_kb: u16) -> Self {
        self.page_size_kb = page_size_kb;
        self
    }

    /// Append an entry; entries are written in insertion order
    #[must_use]
    pub fn add(mut self, ckey: ContentKey, size: u64, keys: Vec<EncodingKey>) -> Self {
        self.entries.push((ckey, EncodingEntry { size, keys }));
        self
    }

    /// Serialize the table
    pub fn build(&self) -> Vec<u8> {
        let page_size = usize::from(self.page_size_kb) * 1024;
        let pages = self.paginate(page_size);

        let header = EncodingHeader {
            ckey_page_size_kb: self.page_size_kb,
            ekey_page_size_kb: self.page_size_kb,
            ckey_page_count: pages.len() as u32,
            espec_block_size: DEFAULT_ESPEC.len() as u32,
            ..EncodingHeader::default()
        };

        let mut out = Cursor::new(Vec::new());
        // Writing into a Vec cannot fail
        let _ = header.write(&mut out);
        let mut out = out.into_inner();
        out.extend_from_slice(DEFAULT_ESPEC);

        for (first_key, page) in &pages {
            out.extend_from_slice(first_key.as_bytes());
            out.extend_from_slice(&md5::compute(page).0);
        }
        for (_, page) in pages {
            out.extend_from_slice(&page);
        }
        out
    }

    fn paginate(&self, page_size: usize) -> Vec<(ContentKey, Vec<u8>)> {
        let mut pages: Vec<(ContentKey, Vec<u8>)> = Vec::new();
        for (ckey, entry) in &self.entries {
            let encoded = encode_entry(ckey, entry);
            match pages.last_mut() {
                Some((_, page)) if page.len() + encoded.len() <= page_size => {
                    page.extend_from_slice(&encoded);
                }
                _ => pages.push((*ckey, encoded)),
            }
        }
        for (_, page) in &mut pages {
            if page.len() < page_size {
                page.resize(page_size, 0);
            }
        }
        pages
    }
}

fn encode_entry(ckey: &ContentKey, entry: &EncodingEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(22 + entry.keys.len() * 16);
    out.push(entry.keys.len() as u8);
    out.push(((entry.size >> 32) & 0xFF) as u8);
    out.extend_from_slice(&((entry.size & 0xFFFF_FFFF) as u32).to_be_bytes());
    out.extend_from_slice(ckey.as_bytes());
    for key in &entry.keys {
        out.extend_from_slice(key.as_bytes());
    }
    out
}
