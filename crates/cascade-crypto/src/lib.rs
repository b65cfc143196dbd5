//! Cryptographic building blocks for CASC archives
//!
//! # Components
//!
//! - **Key management**: [`KeyStore`] maps 64-bit key names to Salsa20 keys,
//!   and [`KeyProvider`] is the lookup seam used by the BLTE decoder
//! - **Encryption**: the 16-byte-key Salsa20 variant used by encrypted blocks
//! - **Hashing**: MD5 content/encoding keys and the Jenkins96 root name hash
//!
//! # Examples
//!
//! ```
//! use cascade_crypto::{KeyProvider, KeyStore};
//!
//! let mut keys = KeyStore::empty();
//! keys.set_key(0xFA50_5078_126A_CB3E, [0x11; 16]);
//! assert!(keys.get_key(0xFA50_5078_126A_CB3E).is_some());
//!
//! let provider: &dyn KeyProvider = &keys;
//! assert!(provider.get_key(0x1234).is_none());
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod jenkins;
pub mod keys;
pub mod md5;
pub mod salsa20;

pub use error::CryptoError;

pub use jenkins::{hashlittle2, name_hash};
pub use keys::{KEY_SIZE, KeyProvider, KeyStore, NamedKey};
pub use self::md5::{ContentKey, EncodingKey};
pub use salsa20::{Salsa20Cipher, block_nonce};
