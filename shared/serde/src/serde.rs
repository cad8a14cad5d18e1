use crate::{
    byte_reader::ByteReader,
    byte_writer::{ByteCounter, ByteWrite},
    error::SerdeErr,
};

/// A type that can be written to and read from the command wire format.
pub trait Serde: Sized + Clone + PartialEq {
    /// Encodes into the writer. Fails only for values the wire format cannot
    /// represent, such as sequences longer than the count prefix allows.
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr>;

    /// Decodes a value from the reader.
    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr>;

    /// Number of bytes `ser` would write.
    fn byte_length(&self) -> Result<usize, SerdeErr> {
        let mut counter = ByteCounter::new();
        self.ser(&mut counter)?;
        Ok(counter.count())
    }
}

/// Implemented by types that always encode to the same number of bytes.
pub trait ConstByteLength {
    fn const_byte_length() -> usize;
}
