use netplay_frame::FrameError;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input ended before a value was complete.
    #[error("short input (needed {needed} bytes, {remaining} remaining)")]
    ShortInput { needed: usize, remaining: usize },

    /// Bytes were left over after the last declared field.
    #[error("{count} trailing bytes after last field")]
    TrailingBytes { count: usize },

    /// A value does not match the kind declared for its field.
    #[error("field {index}: expected {expected}, found {found}")]
    KindMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    /// A required field is null or absent.
    #[error("field {index} is missing")]
    MissingField { index: u16 },

    /// A record carries a field index its schema does not declare.
    #[error("schema {schema} has no field {index}")]
    UnknownField { schema: String, index: u16 },

    /// Two fields of one schema share an index.
    #[error("schema {schema} declares field {index} more than once")]
    DuplicateIndex { schema: String, index: u16 },

    /// A presence or bool byte is neither 0 nor 1.
    #[error("field {index}: invalid flag byte 0x{value:02x}")]
    InvalidFlag { index: u16, value: u8 },

    /// A string field is not valid UTF-8.
    #[error("field {index}: string is not valid UTF-8")]
    InvalidUtf8 { index: u16 },

    /// A string, array, nested record or list is longer than a u16 prefix allows.
    #[error("field {index}: length {len} exceeds {max}", max = u16::MAX)]
    LengthOverflow { index: u16, len: usize },

    /// Framing or payload filter failure.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, CodecError>;
