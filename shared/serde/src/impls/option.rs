use crate::{byte_reader::ByteReader, byte_writer::ByteWrite, error::SerdeErr, serde::Serde};

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        match self {
            Some(value) => {
                true.ser(writer)?;
                value.ser(writer)
            }
            None => false.ser(writer),
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        if bool::de(reader)? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Serde> Serde for Box<T> {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        (**self).ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Box::new(T::de(reader)?))
    }
}
