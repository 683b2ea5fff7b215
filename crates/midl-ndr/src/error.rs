//! NDR error types

use thiserror::Error;

/// NDR encoding/decoding errors
#[derive(Debug, Error)]
pub enum NdrError {
    /// Truncated input: a read ran past the end of the buffer
    #[error("unexpected end of buffer: needed {needed} bytes, have {have}")]
    UnexpectedEndOfBuffer { needed: usize, have: usize },

    /// A declared element count exceeds what is left in the buffer
    #[error("buffer overflow: declared size {declared} exceeds remaining {remaining} bytes")]
    BufferOverflow { declared: u64, remaining: usize },

    /// A size word outside the accepted range
    #[error("size {size} out of range (limit {limit})")]
    SizeOutOfRange { size: u64, limit: u64 },

    /// Varying array bounds inconsistent with the conformant maximum
    #[error("conformance mismatch: max_count={max_count}, offset={offset}, actual_count={actual_count}")]
    ConformanceMismatch {
        max_count: u64,
        offset: u64,
        actual_count: u64,
    },

    /// Array elements requested for a dimension whose size was never established
    #[error("size of dimension {dimension} is not known")]
    MissingSize { dimension: usize },

    /// A `[ref]` pointer arrived with a null marker
    #[error("null marker for reference pointer")]
    NullReferencePointer,

    /// A deferred referent slot was filled twice
    #[error("referent already set")]
    ReferentAlreadySet,

    /// Union discriminant with no matching arm
    #[error("invalid union discriminant: {0}")]
    InvalidDiscriminant(i32),

    /// Enum value outside the range the transfer syntax can carry
    #[error("invalid enum value: {0}")]
    InvalidEnumValue(i32),

    /// Invalid string - not null terminated or invalid encoding
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// UTF-16 decoding error
    #[error("UTF-16 error: {0}")]
    Utf16Error(#[from] std::char::DecodeUtf16Error),
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
