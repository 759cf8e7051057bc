//! Chunk tracking for bounded-packet transfers.

/// Chunk tracking state for stateful sending.
#[derive(Debug, Default, Clone)]
pub struct ChunkState {
    /// Current chunk index.
    pub current: usize,
    /// Total number of chunks.
    pub total: usize,
    /// Current byte offset.
    pub offset: usize,
    /// Size of each chunk.
    pub chunk_size: usize,
    /// Declared transfer size.
    pub data_size: usize,
}

impl ChunkState {
    /// `chunk_size` must be non-zero.
    pub fn new(data_size: usize, chunk_size: usize) -> Self {
        let total = if data_size == 0 {
            0
        } else {
            data_size.div_ceil(chunk_size)
        };
        Self {
            current: 0,
            total,
            offset: 0,
            chunk_size,
            data_size,
        }
    }

    /// Get next chunk from data, advancing state.
    pub fn next_chunk<'a>(&mut self, data: &'a [u8]) -> Option<&'a [u8]> {
        if self.offset >= data.len() || self.offset >= self.data_size {
            return None;
        }

        let remaining = (self.data_size - self.offset).min(data.len() - self.offset);
        let chunk_len = remaining.min(self.chunk_size);

        let chunk = &data[self.offset..self.offset + chunk_len];
        self.offset += chunk_len;
        self.current += 1;

        Some(chunk)
    }

    /// Check if done.
    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }

    /// Progress as percentage.
    pub fn progress_pct(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            ((self.current * 100) / self.total) as u8
        }
    }
}
