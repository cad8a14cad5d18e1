use crate::{
    byte_reader::ByteReader, byte_writer::ByteWrite, constants::MAX_SEQUENCE_LEN,
    error::SerdeErr, serde::Serde,
};

/// Writes the 2-byte element count of a sequence, failing when it does not fit.
pub fn write_sequence_len(writer: &mut dyn ByteWrite, len: usize) -> Result<(), SerdeErr> {
    let Ok(count) = u16::try_from(len) else {
        return Err(SerdeErr::SequenceTooLong {
            len,
            max: MAX_SEQUENCE_LEN,
        });
    };
    count.ser(writer)
}

pub fn read_sequence_len(reader: &mut ByteReader) -> Result<usize, SerdeErr> {
    Ok(u16::de(reader)? as usize)
}

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        write_sequence_len(writer, self.len())?;
        for item in self {
            item.ser(writer)?;
        }
        Ok(())
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let count = read_sequence_len(reader)?;
        // never trust the prefix for the allocation size
        let mut output = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }
}
