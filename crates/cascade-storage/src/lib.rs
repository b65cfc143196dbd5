//! Storage access for CASC builds
//!
#![allow(clippy::cast_possible_truncation)] // Index fields are 32-bit on disk
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::cast_precision_loss)] // Backoff arithmetic
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Many CASC-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! [`CascHandler`] ties the parsers of `cascade-formats` to actual bytes. It
//! reads a local installation, or a CDN through a validated disk cache, and
//! resolves file names, file data IDs and content keys to decoded contents.
//!
//! # Example
//!
//! ```no_run
//! use cascade_storage::{CascHandler, StorageConfig};
//!
//! let handler = CascHandler::open(StorageConfig::new("/games/World of Warcraft/_retail_"))?;
//! let data = handler.read_file_by_name("Interface/FrameXML/Localization.lua")?;
//! println!("build {:?}: {} bytes", handler.build_number(), data.len());
//! # Ok::<(), cascade_storage::StorageError>(())
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod cdn;
pub mod config;
pub mod error;
pub mod handler;
pub mod retry;
pub mod source;

pub use cache::{CacheLookup, DiskCache};
pub use cdn::{CdnClient, CdnKind};
pub use config::{Mode, StorageConfig};
pub use error::{InitStage, Result, StorageError};
pub use handler::CascHandler;
pub use retry::RetryPolicy;
pub use source::{ArchiveRef, DataSource, ResourceKind};

pub use cascade_formats::root::{ContentFlags, LocaleFlags};
