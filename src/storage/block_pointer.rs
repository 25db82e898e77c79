//! Block pointer records: one fixed-width entry per physical data block

use crate::core::point::PointId;
use crate::core::temporal::TimeTag;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

/// Size of one persisted pointer record (12 bytes: point id i32 + start time f64)
pub const POINTER_RECORD_LEN: usize = 12;

/// Ownership metadata for one data block.
///
/// The index is the block's position in the allocation table and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPointer {
    index: usize,
    point_id: PointId,
    start_time: TimeTag,
}

impl BlockPointer {
    /// Create a pointer for a block nobody owns yet
    pub fn unallocated(index: usize) -> Self {
        Self {
            index,
            point_id: PointId::UNALLOCATED,
            start_time: TimeTag::MIN,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn point_id(&self) -> PointId {
        self.point_id
    }

    pub fn start_time(&self) -> TimeTag {
        self.start_time
    }

    pub fn is_allocated(&self) -> bool {
        !self.point_id.is_unallocated()
    }

    /// True when this block belongs to `point_id` and starts within `[start, end]`
    pub fn matches(&self, point_id: PointId, start: TimeTag, end: TimeTag) -> bool {
        self.is_allocated()
            && self.point_id == point_id
            && self.start_time >= start
            && self.start_time <= end
    }

    /// Hand the block to `point_id`, recording the time of its first sample
    pub(crate) fn stamp(&mut self, point_id: PointId, start_time: TimeTag) {
        self.point_id = point_id;
        self.start_time = start_time;
    }

    /// Snapshot this pointer as a handle that outlives any table lock
    pub fn handle(&self) -> DataBlock {
        DataBlock {
            index: self.index,
            point_id: self.point_id,
            start_time: self.start_time,
        }
    }
}

/// Handle to a data block, copied out of the table at lookup time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataBlock {
    pub index: usize,
    pub point_id: PointId,
    pub start_time: TimeTag,
}

/// Serialize a pointer record
pub fn encode_pointer(pointer: &BlockPointer, buf: &mut BytesMut) {
    // Point id (4 bytes)
    buf.put_i32_le(pointer.point_id.as_i32());

    // Start time (8 bytes)
    buf.put_f64_le(pointer.start_time.as_secs());
}

/// Deserialize the pointer record for block `index`, advancing `buf`.
///
/// Start times outside the valid range are clamped to `TimeTag::MIN` so that a
/// partially written record does not prevent the file from opening. The caller
/// guarantees at least [`POINTER_RECORD_LEN`] bytes remain.
pub fn decode_pointer(index: usize, buf: &mut &[u8]) -> BlockPointer {
    let point_id = PointId::from_raw(buf.get_i32_le());
    let start_time = TimeTag::clamped(buf.get_f64_le());

    BlockPointer {
        index,
        point_id,
        start_time,
    }
}
