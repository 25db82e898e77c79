//! Data-block payload collaborator

use crate::error::Result;
use crate::storage::block_pointer::DataBlock;
use parking_lot::Mutex;

/// Persisted size of one archived sample (time, quality flags and value)
pub const SAMPLE_LEN: usize = 10;

/// Payload layer that stores the samples inside each data block.
///
/// The allocation table only asks whether a block can take more samples and
/// asks for blocks to be emptied; it never encodes samples itself.
///
/// `is_full` and `has_data` are called while the table's pointer list is locked
/// and must not call back into the table.
pub trait BlockPayload: Send + Sync {
    /// Whether the block cannot take another sample
    fn is_full(&self, block: &DataBlock) -> bool;

    /// Whether the block still holds samples from an earlier owner
    fn has_data(&self, index: usize) -> bool;

    /// Discard all samples stored in the block
    fn reset(&self, index: usize) -> Result<()>;

    /// Prepare storage for a block that was just appended to the table
    fn initialize(&self, index: usize) -> Result<()>;
}

/// In-memory payload that tracks how many samples each block holds
pub struct MemoryPayload {
    capacity: usize,
    counts: Mutex<Vec<usize>>,
}

impl MemoryPayload {
    /// Create a payload for `block_count` empty blocks of `block_size_kb` KiB each
    pub fn new(block_size_kb: i32, block_count: usize) -> Self {
        let capacity = block_size_kb.max(0) as usize * 1024 / SAMPLE_LEN;
        Self::with_capacity(capacity, block_count)
    }

    /// Create a payload whose blocks each hold `capacity` samples
    pub fn with_capacity(capacity: usize, block_count: usize) -> Self {
        Self {
            capacity,
            counts: Mutex::new(vec![0; block_count]),
        }
    }

    /// Samples a single block can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record `samples` more samples written into block `index`
    pub fn append(&self, index: usize, samples: usize) {
        let mut counts = self.counts.lock();
        if counts.len() <= index {
            counts.resize(index + 1, 0);
        }
        counts[index] = (counts[index] + samples).min(self.capacity);
    }

    pub fn sample_count(&self, index: usize) -> usize {
        self.counts.lock().get(index).copied().unwrap_or(0)
    }
}

impl BlockPayload for MemoryPayload {
    fn is_full(&self, block: &DataBlock) -> bool {
        self.sample_count(block.index) >= self.capacity
    }

    fn has_data(&self, index: usize) -> bool {
        self.sample_count(index) > 0
    }

    fn reset(&self, index: usize) -> Result<()> {
        if let Some(count) = self.counts.lock().get_mut(index) {
            *count = 0;
        }
        Ok(())
    }

    fn initialize(&self, index: usize) -> Result<()> {
        let mut counts = self.counts.lock();
        if counts.len() <= index {
            counts.resize(index + 1, 0);
        }
        counts[index] = 0;
        Ok(())
    }
}
