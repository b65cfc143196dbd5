//! Root table: file names and file data IDs to content keys
//!
//! The WoW root table is a sequence of little-endian blocks read until the
//! end of the decoded file:
//!
//! ```text
//! count: u32 | contentFlags: u32 | localeFlags: u32
//! count × fileDataIdDelta: i32
//! count × { md5: [u8; 16], nameHash: u64 }
//! ```
//!
//! File data IDs are delta encoded within a block: `id = running + delta`,
//! then `running = id + 1`. Several entries may share a name hash; lookups
//! narrow them by locale first and content flags second.

mod builder;
mod flags;

pub use builder::RootBuilder;
pub use flags::{ContentFlags, LocaleFlags};

use binrw::BinReaderExt;
use cascade_crypto::ContentKey;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

/// Bytes per entry: delta plus md5 plus name hash
const ENTRY_SIZE: usize = 4 + 16 + 8;

/// Root table errors
#[derive(Debug, Error)]
pub enum RootError {
    /// Block runs past the end of the table
    #[error("truncated root block at offset {offset}")]
    Truncated {
        /// Offset of the block header
        offset: u64,
    },

    /// Block without any locale
    #[error("root block at offset {offset} has no locale flags")]
    NoLocale {
        /// Offset of the block header
        offset: u64,
    },

    /// Binary read error
    #[error("binary format error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for root operations
pub type RootResult<T> = Result<T, RootError>;

/// One root record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootEntry {
    /// Content key of the file
    pub md5: ContentKey,
    /// Jenkins96 hash of the normalized file name
    pub name_hash: u64,
    /// Numeric file data ID
    pub file_data_id: i32,
    /// Locales of the owning block
    pub locale_flags: LocaleFlags,
    /// Content flags of the owning block
    pub content_flags: ContentFlags,
}

/// Parsed root table
#[derive(Debug, Clone, Default)]
pub struct RootFile {
    entries: Vec<RootEntry>,
    by_name: HashMap<u64, Vec<usize>>,
    names: Vec<u64>,
    by_id: HashMap<i32, u64>,
}

impl RootFile {
    /// Parse a decoded root table
    pub fn parse(data: &[u8]) -> RootResult<Self> {
        let mut root = Self::default();
        let mut reader = Cursor::new(data);
        let mut blocks = 0usize;
        let mut dropped_ids = 0usize;

        while (reader.position() as usize) < data.len() {
            let offset = reader.position();
            let count: u32 = reader.read_le()?;
            let content_flags = ContentFlags(reader.read_le()?);
            let locale_flags = LocaleFlags(reader.read_le()?);

            if locale_flags.0 == LocaleFlags::NONE {
                return Err(RootError::NoLocale { offset });
            }

            let count = count as usize;
            let remaining = data.len() - reader.position() as usize;
            if count.checked_mul(ENTRY_SIZE).is_none_or(|needed| needed > remaining) {
                return Err(RootError::Truncated { offset });
            }

            let mut ids = Vec::with_capacity(count);
            let mut running = 0i32;
            for _ in 0..count {
                let delta: i32 = reader.read_le()?;
                let id = running.wrapping_add(delta);
                ids.push(id);
                running = id.wrapping_add(1);
            }

            for file_data_id in ids {
                let md5: ContentKey = reader.read_le()?;
                let name_hash: u64 = reader.read_le()?;
                if !root.insert(RootEntry {
                    md5,
                    name_hash,
                    file_data_id,
                    locale_flags,
                    content_flags,
                }) {
                    dropped_ids += 1;
                }
            }
            blocks += 1;
        }

        debug!(
            "parsed root table: {} blocks, {} entries, {} names, {} file data IDs",
            blocks,
            root.entries.len(),
            root.names.len(),
            root.by_id.len()
        );
        if dropped_ids > 0 {
            warn!("{} conflicting file data IDs dropped", dropped_ids);
        }
        Ok(root)
    }

    /// Add an entry, returning false when its file data ID was already
    /// claimed by another name hash
    fn insert(&mut self, entry: RootEntry) -> bool {
        let index = self.entries.len();
        self.entries.push(entry);

        match self.by_name.entry(entry.name_hash) {
            Entry::Occupied(mut slot) => slot.get_mut().push(index),
            Entry::Vacant(slot) => {
                slot.insert(vec![index]);
                self.names.push(entry.name_hash);
            }
        }

        match self.by_id.entry(entry.file_data_id) {
            Entry::Vacant(slot) => {
                slot.insert(entry.name_hash);
                true
            }
            Entry::Occupied(slot) if *slot.get() == entry.name_hash => true,
            Entry::Occupied(slot) => {
                warn!(
                    "file data ID {} already maps to {:016X}, dropping {:016X}",
                    entry.file_data_id,
                    slot.get(),
                    entry.name_hash
                );
                false
            }
        }
    }

    /// Entries for a name hash, narrowed by locale and then content flags
    ///
    /// Entries sharing a locale with `locale` are kept. If more than one
    /// remains, those whose content flags equal `content` are returned
    /// instead, provided there are any.
    pub fn get_entries(
        &self,
        name_hash: u64,
        locale: LocaleFlags,
        content: ContentFlags,
    ) -> Vec<&RootEntry> {
        let Some(indices) = self.by_name.get(&name_hash) else {
            return Vec::new();
        };

        let matched: Vec<&RootEntry> = indices
            .iter()
            .map(|&i| &self.entries[i])
            .filter(|entry| entry.locale_flags.matches(locale))
            .collect();

        if matched.len() > 1 {
            let exact: Vec<&RootEntry> = matched
                .iter()
                .copied()
                .filter(|entry| entry.content_flags == content)
                .collect();
            if !exact.is_empty() {
                return exact;
            }
        }
        matched
    }

    /// Entries for a file data ID, with the same narrowing as [`Self::get_entries`]
    pub fn get_entries_by_id(
        &self,
        file_data_id: i32,
        locale: LocaleFlags,
        content: ContentFlags,
    ) -> Vec<&RootEntry> {
        self.name_hash_for_id(file_data_id)
            .map(|hash| self.get_entries(hash, locale, content))
            .unwrap_or_default()
    }

    /// Name hash registered for a file data ID
    pub fn name_hash_for_id(&self, file_data_id: i32) -> Option<u64> {
        self.by_id.get(&file_data_id).copied()
    }

    /// Every entry surviving the [`Self::get_entries`] narrowing, grouped by
    /// name hash in first-seen order
    pub fn resolve_all(
        &self,
        locale: LocaleFlags,
        content: ContentFlags,
    ) -> impl Iterator<Item = (u64, &RootEntry)> + '_ {
        self.names.iter().flat_map(move |&hash| {
            self.get_entries(hash, locale, content)
                .into_iter()
                .map(move |entry| (hash, entry))
        })
    }

    /// All entries in table order
    pub fn iter(&self) -> impl Iterator<Item = &RootEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct name hashes
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENUS: LocaleFlags = LocaleFlags(LocaleFlags::ENUS);
    const DEDE: LocaleFlags = LocaleFlags(LocaleFlags::DEDE);
    const WINDOWS: ContentFlags = ContentFlags(ContentFlags::LOAD_ON_WINDOWS);
    const MACOS: ContentFlags = ContentFlags(ContentFlags::LOAD_ON_MACOS);

    fn md5(n: u8) -> ContentKey {
        ContentKey::from_bytes([n; 16])
    }

    #[test]
    fn test_delta_encoded_ids() {
        let data = RootBuilder::new()
            .add_block(
                ContentFlags::default(),
                ENUS,
                &[(10, md5(1), 0xA), (11, md5(2), 0xB), (20, md5(3), 0xC)],
            )
            .add_block(ContentFlags::default(), ENUS, &[(5, md5(4), 0xD)])
            .build();

        let root = RootFile::parse(&data).expect("Operation should succeed");
        let ids: Vec<i32> = root.iter().map(|e| e.file_data_id).collect();
        assert_eq!(ids, vec![10, 11, 20, 5]);
        assert_eq!(root.name_hash_for_id(20), Some(0xC));
        assert_eq!(root.name_hash_for_id(5), Some(0xD));
    }

    #[test]
    fn test_locale_filter_single_match() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(1, md5(1), 0xAA)])
            .add_block(WINDOWS, DEDE, &[(1, md5(2), 0xAA)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        let entries = root.get_entries(0xAA, DEDE, ContentFlags::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].md5, md5(2));
    }

    #[test]
    fn test_content_filter_narrows_locale_matches() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(1, md5(1), 0xAA)])
            .add_block(MACOS, ENUS, &[(1, md5(2), 0xAA)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        let mac = root.get_entries(0xAA, ENUS, MACOS);
        assert_eq!(mac.len(), 1);
        assert_eq!(mac[0].md5, md5(2));

        // No exact content match keeps the locale matches
        let any = root.get_entries(0xAA, ENUS, ContentFlags::default());
        assert_eq!(any.len(), 2);
        assert_eq!(any[0].md5, md5(1));
    }

    #[test]
    fn test_lookup_by_id() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(42, md5(9), 0x1234)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        let entries = root.get_entries_by_id(42, ENUS, WINDOWS);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_hash, 0x1234);
        assert!(root.get_entries_by_id(43, ENUS, WINDOWS).is_empty());
    }

    #[test]
    fn test_conflicting_id_is_dropped() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(7, md5(1), 0x1)])
            .add_block(WINDOWS, ENUS, &[(7, md5(2), 0x2)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        assert_eq!(root.name_hash_for_id(7), Some(0x1));
        // The entry itself is still reachable by name
        assert_eq!(root.get_entries(0x2, ENUS, WINDOWS).len(), 1);
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_resolve_all_in_first_seen_order() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(1, md5(1), 0x30), (2, md5(2), 0x10)])
            .add_block(WINDOWS, DEDE, &[(3, md5(3), 0x20), (1, md5(4), 0x30)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        let resolved: Vec<(u64, ContentKey)> = root
            .resolve_all(ENUS, WINDOWS)
            .map(|(hash, entry)| (hash, entry.md5))
            .collect();
        assert_eq!(resolved, vec![(0x30, md5(1)), (0x10, md5(2))]);
        assert_eq!(root.name_count(), 3);
    }

    #[test]
    fn test_resolve_all_keeps_every_content_variant() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(1, md5(1), 0xAA), (2, md5(3), 0xBB)])
            .add_block(MACOS, ENUS, &[(1, md5(2), 0xAA)])
            .build();
        let root = RootFile::parse(&data).expect("Operation should succeed");

        let resolved: Vec<(u64, ContentKey)> = root
            .resolve_all(ENUS, ContentFlags::default())
            .map(|(hash, entry)| (hash, entry.md5))
            .collect();
        assert_eq!(
            resolved,
            vec![(0xAA, md5(1)), (0xAA, md5(2)), (0xBB, md5(3))]
        );
        // An exact content match still narrows to one variant
        assert_eq!(root.resolve_all(ENUS, MACOS).count(), 2);
    }

    #[test]
    fn test_truncated_block() {
        let mut data = RootBuilder::new()
            .add_block(WINDOWS, ENUS, &[(1, md5(1), 0x1), (2, md5(2), 0x2)])
            .build();
        data.truncate(data.len() - 5);

        let result = RootFile::parse(&data);
        assert!(matches!(result, Err(RootError::Truncated { offset: 0 })));
    }

    #[test]
    fn test_block_without_locale() {
        let data = RootBuilder::new()
            .add_block(WINDOWS, LocaleFlags(LocaleFlags::NONE), &[(1, md5(1), 0x1)])
            .build();

        let result = RootFile::parse(&data);
        assert!(matches!(result, Err(RootError::NoLocale { offset: 0 })));
    }

    #[test]
    fn test_empty_table() {
        let root = RootFile::parse(&[]).expect("Operation should succeed");
        assert!(root.is_empty());
        assert!(root.get_entries(1, ENUS, WINDOWS).is_empty());
    }
}
