use crate::{
    byte_reader::ByteReader, byte_writer::ByteWrite, error::SerdeErr, serde::Serde,
    ConstByteLength,
};

// Fixed-width scalars are always little-endian so every peer agrees on the
// byte layout regardless of platform.
macro_rules! impl_serde_for_scalar {
    ($($t:ty => $n:expr),* $(,)?) => {
        $(
            impl Serde for $t {
                fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
                    writer.write_bytes(&self.to_le_bytes());
                    Ok(())
                }

                fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
                    Ok(<$t>::from_le_bytes(reader.read_array::<$n>()?))
                }

                fn byte_length(&self) -> Result<usize, SerdeErr> {
                    Ok($n)
                }
            }

            impl ConstByteLength for $t {
                fn const_byte_length() -> usize {
                    $n
                }
            }
        )*
    };
}

impl_serde_for_scalar! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

impl Serde for bool {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        writer.write_byte(u8::from(*self));
        Ok(())
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(SerdeErr::InvalidBool { byte }),
        }
    }

    fn byte_length(&self) -> Result<usize, SerdeErr> {
        Ok(1)
    }
}

impl ConstByteLength for bool {
    fn const_byte_length() -> usize {
        1
    }
}

impl Serde for () {
    fn ser(&self, _writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        Ok(())
    }

    fn de(_reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(())
    }
}

impl ConstByteLength for () {
    fn const_byte_length() -> usize {
        0
    }
}
