//! Encryption key management
//!
//! Encrypted BLTE blocks name their key with a 64-bit identifier. The
//! [`KeyStore`] maps those identifiers to 16-byte Salsa20 keys. It starts out
//! seeded with the publicly known keys and can be extended at runtime, either
//! one key at a time or from a key file with `name;key` lines.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::CryptoError;

/// Size of an encryption key in bytes
pub const KEY_SIZE: usize = 16;

/// Source of decryption keys for encrypted blocks
///
/// The BLTE decoder only needs lookups, so it takes `&dyn KeyProvider`
/// rather than a concrete store. Tests can inject a fixed key set.
pub trait KeyProvider {
    /// Look up the key registered under `key_name`
    fn get_key(&self, key_name: u64) -> Option<[u8; KEY_SIZE]>;
}

/// A named encryption key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedKey {
    /// 64-bit key name
    pub name: u64,
    /// 16-byte key
    pub key: [u8; KEY_SIZE],
}

impl NamedKey {
    /// Create a new named key
    pub fn new(name: u64, key: [u8; KEY_SIZE]) -> Self {
        Self { name, key }
    }

    /// Parse the key bytes from a hex string (exactly 32 hex characters)
    pub fn from_hex(name: u64, hex: &str) -> Result<Self, CryptoError> {
        let hex = hex.trim();
        if hex.len() != KEY_SIZE * 2 {
            return Err(CryptoError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: hex.len() / 2,
            });
        }

        let mut key = [0u8; KEY_SIZE];
        hex::decode_to_slice(hex, &mut key)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;
        Ok(Self::new(name, key))
    }

    /// Parse a `name;key` key file line
    pub fn parse_line(line: &str) -> Result<Self, CryptoError> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != 2 {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "expected 2 fields, got {}",
                fields.len()
            )));
        }

        let name = parse_key_name(fields[0])?;
        Self::from_hex(name, fields[1])
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X};{}", self.name, hex::encode_upper(self.key))
    }
}

/// In-memory key table
#[derive(Debug, Clone)]
pub struct KeyStore {
    keys: HashMap<u64, [u8; KEY_SIZE]>,
}

impl KeyStore {
    /// Create a key store seeded with the known keys
    pub fn new() -> Self {
        let mut store = Self::empty();
        store.load_known_keys();
        store
    }

    /// Create an empty key store
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    fn load_known_keys(&mut self) {
        const KNOWN_KEYS: &[(u64, &str)] = &[
            // Battle for Azeroth
            (0xFA50_5078_126A_CB3E, "BDC51862ABED79B2DE48C8E7E66C6200"),
            (0xFF81_3F7D_062A_C0BC, "AA0B5C77F088CCC2D39049BD267F066D"),
            (0xD1E9_B5ED_F928_3668, "8E4A2579894E38B4AB9058BA5C7328EE"),
            // Shadowlands
            (0xB767_2964_1141_CB34, "9849D1AA7B1FD09819C5C66283A326EC"),
            (0xFFB9_469F_F16E_6BF8, "D514BD1909A9E5DC8703F4B8BB1DFD9A"),
            // The War Within
            (0x0EBE_36B5_010D_FD7F, "9A89CC7E3ACB29CF14C60BC13B1E4616"),
            // Classic
            (0xDEE3_A052_1EFF_6F03, "AD740CE3FFFF9231468126985708E1B9"),
            (0x4F0F_E18E_9FA1_AC1A, "89381C748F6531BBFCD97753D06CC3CD"),
            (0x7758_B2CF_1E4E_3E1B, "3DE60D37C664723595F27C5CDBF08BFA"),
            (0xE531_7801_B356_1125, "7D1E61BF5FD58346972365D53ACC66DC"),
        ];

        for &(name, hex) in KNOWN_KEYS {
            if let Ok(key) = NamedKey::from_hex(name, hex) {
                self.keys.insert(key.name, key.key);
            }
        }
    }

    /// Get a key by name
    pub fn get_key(&self, name: u64) -> Option<[u8; KEY_SIZE]> {
        self.keys.get(&name).copied()
    }

    /// Register a key, replacing any previous key with the same name
    pub fn set_key(&mut self, name: u64, key: [u8; KEY_SIZE]) {
        self.keys.insert(name, key);
    }

    /// Remove a key
    pub fn remove_key(&mut self, name: u64) -> Option<[u8; KEY_SIZE]> {
        self.keys.remove(&name)
    }

    /// Number of keys in the store
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Load keys from key file content (`name_hex;key_hex` per line)
    ///
    /// Blank lines and lines starting with `#` are ignored. Malformed lines
    /// (wrong field count, bad name, key not exactly 32 hex characters) are
    /// skipped. Returns the number of keys loaded.
    ///
    /// ```
    /// use cascade_crypto::KeyStore;
    ///
    /// let mut store = KeyStore::empty();
    /// let loaded = store.load_from_str(
    ///     "FA505078126ACB3E;BDC51862ABED79B2DE48C8E7E66C6200\nnot a key line\n",
    /// );
    /// assert_eq!(loaded, 1);
    /// ```
    pub fn load_from_str(&mut self, content: &str) -> usize {
        let mut count = 0;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Ok(key) = NamedKey::parse_line(line) {
                self.set_key(key.name, key.key);
                count += 1;
            }
        }

        count
    }

    /// Load keys from a key file on disk
    pub fn load_keys(&mut self, path: impl AsRef<Path>) -> Result<usize, CryptoError> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.load_from_str(&content))
    }

    /// Iterate over all keys
    pub fn iter(&self) -> impl Iterator<Item = NamedKey> + '_ {
        self.keys.iter().map(|(&name, &key)| NamedKey::new(name, key))
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for KeyStore {
    fn get_key(&self, key_name: u64) -> Option<[u8; KEY_SIZE]> {
        Self::get_key(self, key_name)
    }
}

impl KeyProvider for HashMap<u64, [u8; KEY_SIZE]> {
    fn get_key(&self, key_name: u64) -> Option<[u8; KEY_SIZE]> {
        self.get(&key_name).copied()
    }
}

/// Parse a key name written as 16 hex characters (optionally `0x`-prefixed)
fn parse_key_name(s: &str) -> Result<u64, CryptoError> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    if digits.is_empty() || digits.len() > 16 {
        return Err(CryptoError::InvalidKeyFormat(format!(
            "invalid key name length: {s}"
        )));
    }

    u64::from_str_radix(digits, 16)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid key name: {e}")))
}
