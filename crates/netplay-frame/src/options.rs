//! Per-frame option flags carried in the byte after the length prefix.

use std::fmt;

/// Bit position of the compressed flag.
pub const COMPRESSED_BIT: u8 = 0;

/// Bit position reserved for encryption. Never set by this crate.
pub const ENCRYPTED_BIT: u8 = 1;

/// Option flags of a single frame.
///
/// Unknown bits are preserved so frames can be relayed untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Options(u8);

impl Options {
    /// No flags set.
    pub const NONE: Options = Options(0);

    /// Only the compressed flag set.
    pub const COMPRESSED: Options = Options(1 << COMPRESSED_BIT);

    /// Wrap a raw options byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw options byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the payload was run through the compression filter.
    pub const fn is_compressed(self) -> bool {
        self.0 & (1 << COMPRESSED_BIT) != 0
    }

    /// Whether the reserved encryption bit is set.
    pub const fn is_encrypted(self) -> bool {
        self.0 & (1 << ENCRYPTED_BIT) != 0
    }

    /// Return a copy with the compressed flag set or cleared.
    pub const fn with_compressed(self, compressed: bool) -> Self {
        if compressed {
            Self(self.0 | (1 << COMPRESSED_BIT))
        } else {
            Self(self.0 & !(1 << COMPRESSED_BIT))
        }
    }
}

impl From<u8> for Options {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl From<Options> for u8 {
    fn from(options: Options) -> Self {
        options.0
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Options[NONE]");
        }
        f.write_str("Options[")?;
        if self.is_compressed() {
            f.write_str("COMPRESSED ")?;
        }
        if self.is_encrypted() {
            f.write_str("ENCRYPTED ")?;
        }
        let unknown = self.0 & !((1 << COMPRESSED_BIT) | (1 << ENCRYPTED_BIT));
        if unknown != 0 {
            write!(f, "0x{unknown:02x} ")?;
        }
        f.write_str("]")
    }
}
