use crate::{
    byte_reader::ByteReader, byte_writer::ByteWrite, constants::MAX_BLOB_LEN, error::SerdeErr,
    serde::Serde,
};

pub(crate) fn write_len_prefixed(writer: &mut dyn ByteWrite, bytes: &[u8]) -> Result<(), SerdeErr> {
    let len = bytes.len();
    let Ok(len_u32) = u32::try_from(len) else {
        return Err(SerdeErr::BlobTooLong {
            len,
            max: MAX_BLOB_LEN,
        });
    };
    len_u32.ser(writer)?;
    writer.write_bytes(bytes);
    Ok(())
}

pub(crate) fn read_len_prefixed<'b>(reader: &mut ByteReader<'b>) -> Result<&'b [u8], SerdeErr> {
    let len = u32::de(reader)? as usize;
    reader.read_bytes(len)
}

impl Serde for String {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        write_len_prefixed(writer, self.as_bytes())
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let bytes = read_len_prefixed(reader)?;
        let Ok(text) = std::str::from_utf8(bytes) else {
            return Err(SerdeErr::InvalidUtf8);
        };
        Ok(text.to_string())
    }

    fn byte_length(&self) -> Result<usize, SerdeErr> {
        Ok(4 + self.len())
    }
}
