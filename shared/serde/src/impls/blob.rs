use std::ops::Deref;

use crate::{
    byte_reader::ByteReader,
    byte_writer::ByteWrite,
    error::SerdeErr,
    impls::string::{read_len_prefixed, write_len_prefixed},
    serde::Serde,
};

/// An opaque byte block with a 4-byte length prefix.
///
/// `Vec<u8>` is encoded as a sequence (2-byte count), so payloads that may
/// exceed 65535 bytes travel as a `Blob` instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serde for Blob {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        write_len_prefixed(writer, &self.0)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self(read_len_prefixed(reader)?.to_vec()))
    }

    fn byte_length(&self) -> Result<usize, SerdeErr> {
        Ok(4 + self.0.len())
    }
}
