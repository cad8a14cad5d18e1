/// Sink for encoded bytes.
///
/// Implemented both by [`ByteWriter`], which keeps the bytes, and by
/// [`ByteCounter`], which only measures how many would have been written.
pub trait ByteWrite {
    fn write_byte(&mut self, byte: u8);

    fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_byte(*byte);
        }
    }

    /// Number of bytes written so far. Used as a cursor that can later be
    /// handed back to [`ByteWrite::truncate`].
    fn bytes_written(&self) -> usize;

    /// Discards everything written after `len` bytes.
    fn truncate(&mut self, len: usize);

    fn is_counter(&self) -> bool;
}

/// A growable byte buffer for outgoing commands.
#[derive(Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl ByteWrite for ByteWriter {
    fn write_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    fn truncate(&mut self, len: usize) {
        self.buffer.truncate(len);
    }

    fn is_counter(&self) -> bool {
        false
    }
}

/// Counts bytes without storing them.
#[derive(Default)]
pub struct ByteCounter {
    count: usize,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl ByteWrite for ByteCounter {
    fn write_byte(&mut self, _byte: u8) {
        self.count += 1;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.count += bytes.len();
    }

    fn bytes_written(&self) -> usize {
        self.count
    }

    fn truncate(&mut self, len: usize) {
        self.count = self.count.min(len);
    }

    fn is_counter(&self) -> bool {
        true
    }
}
