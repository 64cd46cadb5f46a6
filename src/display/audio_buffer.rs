//! Staging buffer between the audio decoder and the device callback
//!
//! Holds the PCM bytes of the most recently decoded frame while the device
//! drains them across one or more callbacks. Owned by a single thread, so no
//! synchronization is involved.

/// Fixed-capacity PCM staging area
///
/// `size` is the write bound of the current contents and `index` the read
/// cursor; the buffer is exhausted once `index >= size`. Every refill
/// replaces the contents and rewinds the cursor, so bytes from a previous
/// frame are never read twice.
pub struct StagingBuffer {
    /// The underlying byte storage, allocated once
    buffer: Vec<u8>,
    /// Number of valid bytes
    size: usize,
    /// Read cursor
    index: usize,
}

impl StagingBuffer {
    /// Create an empty staging buffer with the given capacity (in bytes)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            size: 0,
            index: 0,
        }
    }

    /// Check whether every staged byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.size
    }

    /// Replace the contents with whatever `produce` writes
    ///
    /// `produce` receives the whole storage and returns how many bytes it
    /// wrote. Returns that count.
    pub fn refill_with<F>(&mut self, produce: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let written = produce(&mut self.buffer).min(self.buffer.len());
        self.size = written;
        self.index = 0;
        written
    }

    /// Replace the contents with `len` bytes of silence
    pub fn fill_silence(&mut self, len: usize) {
        let len = len.min(self.buffer.len());
        self.buffer[..len].fill(0);
        self.size = len;
        self.index = 0;
    }

    /// Copy staged bytes into `output`
    ///
    /// Copies `min(output.len(), remaining)` bytes and advances the cursor.
    /// Returns the number of bytes copied.
    pub fn read_into(&mut self, output: &mut [u8]) -> usize {
        let len = output.len().min(self.remaining());
        output[..len].copy_from_slice(&self.buffer[self.index..self.index + len]);
        self.index += len;
        len
    }

    /// Get the number of bytes still to be read
    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.index)
    }

    /// Get the write bound of the current contents
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the read cursor
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}
