//! File format parsers for CASC archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Many CASC-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate turns the raw files of a CASC installation into lookup tables
//! and decoded bytes. It performs no I/O beyond reading the streams it is
//! given; locating files on disk or on a CDN is left to `cascade-storage`.
//!
//! # Supported Formats
//!
//! - **BLTE**: chunked container with stored, deflated and encrypted blocks
//! - **Index**: local `.idx` bucket indices and CDN `.index` archive indices
//! - **Encoding**: content key to encoding key table
//! - **Root**: name hash and file data ID to content key table (WoW layout)
//! - **Config**: `.build.info`, build config and CDN config text files
//!
//! # Resolution Chain
//!
//! ```text
//! .build.info -> build config -> encoding ekey -> index -> BLTE -> EncodingFile
//!                             -> root ckey -> EncodingFile -> index -> BLTE -> RootFile
//! name -> name hash -> RootFile -> ckey -> EncodingFile -> ekey -> index -> BLTE
//! ```

#![warn(missing_docs)]

pub mod blte;
/// Configuration files (`.build.info`, build config, CDN config)
pub mod config;
/// Content key to encoding key table
pub mod encoding;
pub mod index;
/// Root table with locale and content flag disambiguation
pub mod root;

pub use blte::{BlteBuilder, BlteError, BlteResult};
pub use config::{BuildConfig, BuildInfo, CdnConfig, ConfigError};
pub use encoding::{EncodingEntry, EncodingError, EncodingFile};
pub use index::{ArchiveIndex, IndexEntry, IndexError, LocalIndex};
pub use root::{ContentFlags, LocaleFlags, RootEntry, RootError, RootFile};
