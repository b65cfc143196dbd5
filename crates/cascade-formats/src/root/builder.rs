//! Root table builder

use cascade_crypto::ContentKey;

use super::{ContentFlags, LocaleFlags};

/// Builder for decoded root tables
///
/// Each block lists `(file_data_id, md5, name_hash)` records; IDs are delta
/// encoded on write in the order given.
#[derive(Debug, Clone, Default)]
pub struct RootBuilder {
    out: Vec<u8>,
}

impl RootBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block
    #[must_use]
    pub fn add_block(
        mut self,
        content: ContentFlags,
        locale: LocaleFlags,
        records: &[(i32, ContentKey, u64)],
    ) -> Self {
        self.out
            .extend_from_slice(&(records.len() as u32).to_le_bytes());
        self.out.extend_from_slice(&content.0.to_le_bytes());
        self.out.extend_from_slice(&locale.0.to_le_bytes());

        let mut running = 0i32;
        for (id, _, _) in records {
            self.out
                .extend_from_slice(&id.wrapping_sub(running).to_le_bytes());
            running = id.wrapping_add(1);
        }
        for (_, md5, name_hash) in records {
            self.out.extend_from_slice(md5.as_bytes());
            self.out.extend_from_slice(&name_hash.to_le_bytes());
        }
        self
    }

    /// Serialized table
    pub fn build(&self) -> Vec<u8> {
        self.out.clone()
    }
}
