use crate::error::SerdeErr;

/// Cursor over an incoming command buffer.
pub struct ByteReader<'b> {
    buffer: &'b [u8],
    cursor: usize,
}

impl<'b> ByteReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor back to a position previously returned by
    /// [`ByteReader::position`]. Positions past the end are clamped.
    pub fn set_position(&mut self, position: usize) {
        self.cursor = position.min(self.buffer.len());
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        let Some(byte) = self.buffer.get(self.cursor) else {
            return Err(SerdeErr::UnexpectedEnd {
                needed: 1,
                remaining: 0,
            });
        };
        self.cursor += 1;
        Ok(*byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'b [u8], SerdeErr> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(SerdeErr::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buffer[start..self.cursor])
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SerdeErr> {
        let mut output = [0u8; N];
        output.copy_from_slice(self.read_bytes(N)?);
        Ok(output)
    }
}
