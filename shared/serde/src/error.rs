use thiserror::Error;

/// Errors that can occur while encoding or decoding wire primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The reader ran out of bytes in the middle of a value
    #[error("Unexpected end of buffer: needed {needed} bytes but only {remaining} remain")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A sequence exceeded the 2-byte element count prefix
    #[error("Sequence of {len} elements exceeds the maximum of {max} elements")]
    SequenceTooLong { len: usize, max: usize },

    /// A string or blob exceeded the 4-byte length prefix
    #[error("Blob of {len} bytes exceeds the maximum of {max} bytes")]
    BlobTooLong { len: usize, max: usize },

    /// A string payload was not valid UTF-8
    #[error("String payload is not valid UTF-8")]
    InvalidUtf8,

    /// A bool was encoded with a byte other than 0 or 1
    #[error("Invalid bool byte {byte}, expected 0 or 1")]
    InvalidBool { byte: u8 },

    /// An enum-like value was encoded with an unknown tag byte
    #[error("Invalid tag byte {tag}")]
    InvalidTag { tag: u8 },
}
