//! Locale and content flags of root entries

use std::fmt;
use std::str::FromStr;

/// Content flags: platform, variant and storage bits of a root block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContentFlags(pub u32);

impl ContentFlags {
    /// No flags
    pub const NONE: u32 = 0;
    /// High resolution texture
    pub const HIGH_RES_TEXTURE: u32 = 0x0000_0001;
    /// Windows client
    pub const LOAD_ON_WINDOWS: u32 = 0x0000_0008;
    /// macOS client
    pub const LOAD_ON_MACOS: u32 = 0x0000_0010;
    /// Low violence variant
    pub const LOW_VIOLENCE: u32 = 0x0000_0080;
    /// Not loaded by the client
    pub const DO_NOT_LOAD: u32 = 0x0000_0100;
    /// Encrypted content
    pub const ENCRYPTED: u32 = 0x0800_0000;
    /// Block carries no name hashes
    pub const NO_NAME_HASH: u32 = 0x1000_0000;
    /// Bundled file
    pub const BUNDLE: u32 = 0x4000_0000;
    /// Stored without compression
    pub const NO_COMPRESSION: u32 = 0x8000_0000;

    /// Create content flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Check if a flag is set
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }
}

impl fmt::Display for ContentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for ContentFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Locale flags: the client locales a root block applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocaleFlags(pub u32);

impl LocaleFlags {
    /// Every locale
    pub const ALL: u32 = 0xFFFF_FFFF;
    /// No locale
    pub const NONE: u32 = 0;
    /// English (United States)
    pub const ENUS: u32 = 0x0000_0002;
    /// Korean
    pub const KOKR: u32 = 0x0000_0004;
    /// French
    pub const FRFR: u32 = 0x0000_0010;
    /// German
    pub const DEDE: u32 = 0x0000_0020;
    /// Chinese (simplified)
    pub const ZHCN: u32 = 0x0000_0040;
    /// Spanish (Spain)
    pub const ESES: u32 = 0x0000_0080;
    /// Chinese (traditional)
    pub const ZHTW: u32 = 0x0000_0100;
    /// English (Great Britain)
    pub const ENGB: u32 = 0x0000_0200;
    /// English (China)
    pub const ENCN: u32 = 0x0000_0400;
    /// English (Taiwan)
    pub const ENTW: u32 = 0x0000_0800;
    /// Spanish (Mexico)
    pub const ESMX: u32 = 0x0000_1000;
    /// Russian
    pub const RURU: u32 = 0x0000_2000;
    /// Portuguese (Brazil)
    pub const PTBR: u32 = 0x0000_4000;
    /// Italian
    pub const ITIT: u32 = 0x0000_8000;
    /// Portuguese (Portugal)
    pub const PTPT: u32 = 0x0001_0000;

    const NAMES: [(&'static str, u32); 15] = [
        ("enUS", Self::ENUS),
        ("koKR", Self::KOKR),
        ("frFR", Self::FRFR),
        ("deDE", Self::DEDE),
        ("zhCN", Self::ZHCN),
        ("esES", Self::ESES),
        ("zhTW", Self::ZHTW),
        ("enGB", Self::ENGB),
        ("enCN", Self::ENCN),
        ("enTW", Self::ENTW),
        ("esMX", Self::ESMX),
        ("ruRU", Self::RURU),
        ("ptBR", Self::PTBR),
        ("itIT", Self::ITIT),
        ("ptPT", Self::PTPT),
    ];

    /// Create locale flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Check if a locale bit is set
    pub const fn has(self, locale: u32) -> bool {
        (self.0 & locale) != 0
    }

    /// Check if any locale is shared with `other`
    pub const fn matches(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

impl Default for LocaleFlags {
    fn default() -> Self {
        Self(Self::ALL)
    }
}

impl fmt::Display for LocaleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for LocaleFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::ops::BitOr for LocaleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Parses `enUS`, `all`, or a `0x` prefixed mask
impl FromStr for LocaleFlags {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self(Self::ALL));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|e| format!("invalid locale mask '{s}': {e}"));
        }
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, value)| Self(value))
            .ok_or_else(|| format!("unknown locale '{s}'"))
    }
}
