/// Largest element count a length-prefixed sequence may carry. The count is
/// written as a `u16`, so anything longer is a hard serialization failure.
pub const MAX_SEQUENCE_LEN: usize = u16::MAX as usize;

/// Largest byte count a string or blob may carry (4-byte length prefix).
pub const MAX_BLOB_LEN: usize = u32::MAX as usize;
