//! Archive file allocation table: maps points and time ranges to data blocks
//!
//! The table lives at the tail of the archive file, right after the data region:
//!
//! ```text
//! [data blocks: block_count * block_size_kb * 1024 bytes]
//! [array descriptor: 10 bytes]
//! [pointer record 0] ... [pointer record N-1]   (12 bytes each)
//! [trailer: 32 bytes]
//! ```
//!
//! Two locks guard the table. The pointer list sits behind an `RwLock` and the
//! stream behind a `Mutex`. A list guard is never held while the stream is
//! touched or while the payload resets or initializes a block. Writers take the
//! stream first and then briefly read the list to snapshot what they persist,
//! so nothing ever waits for the stream while holding the list.

use crate::core::point::PointId;
use crate::core::temporal::TimeTag;
use crate::error::{Error, Result};
use crate::index::temporal::{find_first, find_last, find_range};
use crate::storage::block_pointer::{
    decode_pointer, encode_pointer, BlockPointer, DataBlock, POINTER_RECORD_LEN,
};
use crate::storage::payload::BlockPayload;
use crate::storage::stream::{ArchiveFileInfo, ArchiveStream};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info, warn};

/// Size of the fixed trailer closing the file (32 bytes)
pub const TRAILER_LEN: usize = 32;

/// Zero padding kept ahead of the pointer records for compatibility (10 bytes)
pub const ARRAY_DESCRIPTOR_LEN: usize = 10;

/// Fixed trailer at the very end of an archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableTrailer {
    pub file_start_time: TimeTag,
    pub file_end_time: TimeTag,
    pub points_received: i32,
    pub points_archived: i32,
    pub block_size_kb: i32,
    pub block_count: i32,
}

impl TableTrailer {
    /// Serialize trailer into `buf`
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_f64_le(self.file_start_time.as_secs());
        buf.put_f64_le(self.file_end_time.as_secs());
        buf.put_i32_le(self.points_received);
        buf.put_i32_le(self.points_archived);
        buf.put_i32_le(self.block_size_kb);
        buf.put_i32_le(self.block_count);
    }

    /// Deserialize trailer from bytes.
    ///
    /// Invalid time-tags are clamped to `TimeTag::MIN`; invalid counts are fatal.
    pub fn deserialize(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < TRAILER_LEN {
            return Err(Error::Corrupt(format!(
                "trailer is {} bytes, expected {}",
                buf.len(),
                TRAILER_LEN
            )));
        }

        let raw_start = buf.get_f64_le();
        let raw_end = buf.get_f64_le();
        let points_received = buf.get_i32_le();
        let points_archived = buf.get_i32_le();
        let block_size_kb = buf.get_i32_le();
        let block_count = buf.get_i32_le();

        if !TimeTag::in_range(raw_start) {
            warn!(raw_start, "file start time out of range, clamping to minimum");
        }
        if !TimeTag::in_range(raw_end) {
            warn!(raw_end, "file end time out of range, clamping to minimum");
        }

        if points_received < 0 || points_archived < 0 {
            return Err(Error::Corrupt(format!(
                "negative point counters (received {}, archived {})",
                points_received, points_archived
            )));
        }
        if block_size_kb < 1 {
            return Err(Error::Corrupt(format!("block size {} KiB", block_size_kb)));
        }
        if block_count < 0 {
            return Err(Error::Corrupt(format!("block count {}", block_count)));
        }

        Ok(Self {
            file_start_time: TimeTag::clamped(raw_start),
            file_end_time: TimeTag::clamped(raw_end),
            points_received,
            points_archived,
            block_size_kb,
            block_count,
        })
    }
}

/// Point-in-time view of the table, for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub file_start_time: TimeTag,
    pub file_end_time: TimeTag,
    pub points_received: i32,
    pub points_archived: i32,
    pub block_size_kb: i32,
    pub block_count: usize,
    pub blocks_used: usize,
    pub blocks_available: usize,
}

/// Everything guarded by the list lock
struct TableState {
    file_start_time: TimeTag,
    file_end_time: TimeTag,
    points_received: i32,
    points_archived: i32,
    pointers: Vec<BlockPointer>,
}

impl TableState {
    fn trailer(&self, block_size_kb: i32) -> TableTrailer {
        TableTrailer {
            file_start_time: self.file_start_time,
            file_end_time: self.file_end_time,
            points_received: self.points_received,
            points_archived: self.points_archived,
            block_size_kb,
            block_count: self.pointers.len() as i32,
        }
    }

    /// The file start time follows the first block allocated in the file
    fn stamp(&mut self, index: usize, point_id: PointId, sample_time: TimeTag) -> DataBlock {
        if !self.pointers.iter().any(|p| p.is_allocated()) {
            self.file_start_time = sample_time;
        }
        if sample_time > self.file_end_time {
            self.file_end_time = sample_time;
        }

        let pointer = &mut self.pointers[index];
        pointer.stamp(point_id, sample_time);
        pointer.handle()
    }

    fn undo_point(&self) -> StampUndo {
        StampUndo {
            file_start_time: self.file_start_time,
            file_end_time: self.file_end_time,
        }
    }

    /// Hand a freshly stamped block back, unless it changed hands since
    fn unstamp(&mut self, block: DataBlock, undo: StampUndo) {
        if self.pointers.get(block.index).map(|p| p.handle()) != Some(block) {
            return;
        }
        self.pointers[block.index] = BlockPointer::unallocated(block.index);

        if !self.pointers.iter().any(|p| p.is_allocated()) {
            self.file_start_time = undo.file_start_time;
        }
        if self.file_end_time == block.start_time {
            self.file_end_time = undo.file_end_time;
        }
    }

    fn push_unallocated(&mut self, count: usize) -> Result<Vec<DataBlock>> {
        let total = self.pointers.len() + count;
        if total > i32::MAX as usize {
            return Err(Error::Range(format!("block count {} exceeds i32", total)));
        }

        let first = self.pointers.len();
        self.pointers
            .extend((first..total).map(BlockPointer::unallocated));
        Ok(self.pointers[first..].iter().map(|p| p.handle()).collect())
    }
}

/// Trailer times from before a stamp
#[derive(Debug, Clone, Copy)]
struct StampUndo {
    file_start_time: TimeTag,
    file_end_time: TimeTag,
}

/// Everything guarded by the stream lock
struct StreamState<S> {
    stream: S,
    /// Block count the on-disk pointer section was last laid out for
    persisted_blocks: usize,
}

/// How `request_block` settled on a block
enum Selection {
    /// Block already owned by the point with room left; nothing to persist
    Owned(DataBlock),
    /// Free block just stamped for the point
    Stamped {
        block: DataBlock,
        reset: bool,
        undo: StampUndo,
    },
    /// Block appended to a historic file and stamped for the point
    Grown(DataBlock),
}

/// File allocation table of one archive file
pub struct AllocationTable<S: ArchiveStream, P: BlockPayload> {
    info: ArchiveFileInfo,
    state: RwLock<TableState>,
    io: Mutex<StreamState<S>>,
    payload: P,
}

impl<S: ArchiveStream, P: BlockPayload> AllocationTable<S, P> {
    /// Lay out a table for a brand-new file of `capacity` bytes and persist it
    pub fn create(stream: S, info: ArchiveFileInfo, capacity: u64, payload: P) -> Result<Self> {
        if info.block_size_kb < 1 {
            return Err(Error::Range(format!(
                "block size {} KiB is below 1",
                info.block_size_kb
            )));
        }

        let block_count = (capacity / info.block_size_bytes()) as usize;
        if block_count > i32::MAX as usize {
            return Err(Error::Range(format!(
                "block count {} exceeds i32",
                block_count
            )));
        }

        let table = Self {
            info,
            state: RwLock::new(TableState {
                file_start_time: TimeTag::MIN,
                file_end_time: TimeTag::MIN,
                points_received: 0,
                points_archived: 0,
                pointers: (0..block_count).map(BlockPointer::unallocated).collect(),
            }),
            io: Mutex::new(StreamState {
                stream,
                persisted_blocks: 0,
            }),
            payload,
        };
        table.save()?;

        info!(
            block_count,
            block_size_kb = info.block_size_kb,
            "created allocation table"
        );
        Ok(table)
    }

    /// Load the table persisted at the tail of `stream`
    pub fn open(stream: S, info: ArchiveFileInfo, payload: P) -> Result<Self> {
        Self::open_with(stream, info, |_| payload)
    }

    /// Load the table persisted at the tail of `stream`, building the payload
    /// from the trailer found on disk
    pub fn open_with<F>(mut stream: S, mut info: ArchiveFileInfo, make_payload: F) -> Result<Self>
    where
        F: FnOnce(&TableTrailer) -> P,
    {
        let len = stream.current_len()?;
        if len < TRAILER_LEN as u64 {
            return Err(Error::Corrupt(format!(
                "stream is {} bytes, too short for a trailer",
                len
            )));
        }

        let mut trailer_buf = [0u8; TRAILER_LEN];
        stream.seek(SeekFrom::Start(len - TRAILER_LEN as u64))?;
        stream.read_exact(&mut trailer_buf)?;
        let trailer = TableTrailer::deserialize(&trailer_buf)?;

        let block_count = trailer.block_count as usize;
        let records_len = (block_count * POINTER_RECORD_LEN) as u64;
        let required = (TRAILER_LEN + ARRAY_DESCRIPTOR_LEN) as u64 + records_len;
        if len < required {
            return Err(Error::Corrupt(format!(
                "stream is {} bytes but {} blocks need {} bytes of table",
                len, block_count, required
            )));
        }

        let records_start = len - TRAILER_LEN as u64 - records_len;
        let mut records = vec![0u8; records_len as usize];
        stream.seek(SeekFrom::Start(records_start))?;
        stream.read_exact(&mut records)?;

        let mut cursor = &records[..];
        let pointers: Vec<BlockPointer> = (0..block_count)
            .map(|index| decode_pointer(index, &mut cursor))
            .collect();

        if trailer.block_size_kb != info.block_size_kb {
            warn!(
                configured = info.block_size_kb,
                on_disk = trailer.block_size_kb,
                "block size differs from configuration, using on-disk value"
            );
            info.block_size_kb = trailer.block_size_kb;
        }

        let data_end = records_start - ARRAY_DESCRIPTOR_LEN as u64;
        if data_end != block_count as u64 * info.block_size_bytes() {
            debug!(
                data_end,
                block_count, "data region length does not match block count"
            );
        }

        info!(
            block_count,
            block_size_kb = info.block_size_kb,
            "opened allocation table"
        );

        Ok(Self {
            info,
            state: RwLock::new(TableState {
                file_start_time: trailer.file_start_time,
                file_end_time: trailer.file_end_time,
                points_received: trailer.points_received,
                points_archived: trailer.points_archived,
                pointers,
            }),
            io: Mutex::new(StreamState {
                stream,
                persisted_blocks: block_count,
            }),
            payload: make_payload(&trailer),
        })
    }

    /// Write the whole pointer section and trailer behind the data region
    pub fn save(&self) -> Result<()> {
        let mut io = self.io.lock();
        self.write_table(&mut io)
    }

    fn write_table(&self, io: &mut StreamState<S>) -> Result<()> {
        let (trailer, pointers) = {
            let state = self.state.read();
            (state.trailer(self.info.block_size_kb), state.pointers.clone())
        };

        let mut buf = BytesMut::with_capacity(
            ARRAY_DESCRIPTOR_LEN + pointers.len() * POINTER_RECORD_LEN + TRAILER_LEN,
        );
        buf.put_bytes(0, ARRAY_DESCRIPTOR_LEN);
        for pointer in &pointers {
            encode_pointer(pointer, &mut buf);
        }
        trailer.serialize(&mut buf);

        io.stream
            .seek(SeekFrom::Start(self.data_region_len(pointers.len())))?;
        io.stream.write_all(&buf)?;
        if !self.info.cache_writes {
            io.stream.flush()?;
        }
        io.persisted_blocks = pointers.len();
        Ok(())
    }

    /// Write one pointer record and the trailer, falling back to a full save
    /// when the pointer section has moved since it was last written
    fn persist_pointer(&self, index: usize) -> Result<()> {
        let mut io = self.io.lock();
        let (trailer, pointer, block_count) = {
            let state = self.state.read();
            (
                state.trailer(self.info.block_size_kb),
                state.pointers[index],
                state.pointers.len(),
            )
        };

        if block_count != io.persisted_blocks {
            return self.write_table(&mut io);
        }

        let records_start = self.data_region_len(block_count) + ARRAY_DESCRIPTOR_LEN as u64;

        let mut record = BytesMut::with_capacity(POINTER_RECORD_LEN);
        encode_pointer(&pointer, &mut record);
        io.stream.seek(SeekFrom::Start(
            records_start + (index * POINTER_RECORD_LEN) as u64,
        ))?;
        io.stream.write_all(&record)?;

        let mut tail = BytesMut::with_capacity(TRAILER_LEN);
        trailer.serialize(&mut tail);
        io.stream.seek(SeekFrom::Start(
            records_start + (block_count * POINTER_RECORD_LEN) as u64,
        ))?;
        io.stream.write_all(&tail)?;

        if !self.info.cache_writes {
            io.stream.flush()?;
        }
        Ok(())
    }

    fn data_region_len(&self, block_count: usize) -> u64 {
        block_count as u64 * self.info.block_size_bytes()
    }

    /// Append `count` free blocks, persist the table and prepare their storage
    pub fn extend(&self, count: usize) -> Result<Vec<DataBlock>> {
        let added = self.state.write().push_unallocated(count)?;
        self.save()?;
        for block in &added {
            self.payload.initialize(block.index)?;
        }

        info!(added = count, block_count = self.block_count(), "extended allocation table");
        Ok(added)
    }

    /// Find the block `point_id` should write a sample taken at `sample_time` into.
    ///
    /// `hint` is the index of the block last used for this point, if known. In
    /// order of preference this reuses the hinted block, the point's latest
    /// block, the first free block, and finally (historic files only) a block
    /// appended to the file. An active file with none of these available fails
    /// with [`Error::ArchiveFull`].
    ///
    /// Concurrent calls for the same point are not ordered against each other.
    pub fn request_block(
        &self,
        point_id: PointId,
        sample_time: TimeTag,
        hint: Option<usize>,
    ) -> Result<DataBlock> {
        if point_id.is_unallocated() {
            return Err(Error::Range(
                "cannot allocate a block to the unallocated point id".to_string(),
            ));
        }

        match self.select_block(point_id, sample_time, hint)? {
            Selection::Owned(block) => {
                debug!(index = block.index, %point_id, "reusing owned block");
                Ok(block)
            }
            Selection::Stamped { block, reset, undo } => {
                // the previous owner's samples must be gone before the block is handed out
                if reset {
                    if let Err(e) = self.payload.reset(block.index) {
                        self.state.write().unstamp(block, undo);
                        warn!(
                            index = block.index,
                            %point_id,
                            error = %e,
                            "reset failed, block released"
                        );
                        return Err(e);
                    }
                }
                self.persist_pointer(block.index)?;
                debug!(index = block.index, %point_id, reset, "allocated free block");
                Ok(block)
            }
            Selection::Grown(block) => {
                self.save()?;
                self.payload.initialize(block.index)?;
                info!(index = block.index, %point_id, "grew historic file by one block");
                Ok(block)
            }
        }
    }

    fn select_block(
        &self,
        point_id: PointId,
        sample_time: TimeTag,
        hint: Option<usize>,
    ) -> Result<Selection> {
        let mut state = self.state.write();

        if let Some(pointer) = hint.and_then(|index| state.pointers.get(index).copied()) {
            if !pointer.is_allocated() {
                let reset = self.payload.has_data(pointer.index());
                let undo = state.undo_point();
                let block = state.stamp(pointer.index(), point_id, sample_time);
                return Ok(Selection::Stamped { block, reset, undo });
            }
            if pointer.point_id() == point_id && !self.payload.is_full(&pointer.handle()) {
                return Ok(Selection::Owned(pointer.handle()));
            }
        }

        if let Some(last) = find_last(&state.pointers, point_id) {
            let block = last.handle();
            if !self.payload.is_full(&block) {
                return Ok(Selection::Owned(block));
            }
        }

        if let Some(index) = find_first(&state.pointers, PointId::UNALLOCATED).map(|p| p.index())
        {
            let reset = self.payload.has_data(index);
            let undo = state.undo_point();
            let block = state.stamp(index, point_id, sample_time);
            return Ok(Selection::Stamped { block, reset, undo });
        }

        if !self.info.is_historic() {
            let block_count = state.pointers.len();
            warn!(block_count, %point_id, "archive full, no block available");
            return Err(Error::ArchiveFull { block_count });
        }

        let index = state.push_unallocated(1)?[0].index;
        Ok(Selection::Grown(state.stamp(index, point_id, sample_time)))
    }

    /// First block owned by `point_id`
    pub fn find_first(&self, point_id: PointId) -> Option<DataBlock> {
        find_first(&self.state.read().pointers, point_id).map(|p| p.handle())
    }

    /// Last block owned by `point_id`
    pub fn find_last(&self, point_id: PointId) -> Option<DataBlock> {
        find_last(&self.state.read().pointers, point_id).map(|p| p.handle())
    }

    /// Blocks of `point_id` that may hold samples in `[start, end]`
    pub fn find_all(&self, point_id: PointId, start: TimeTag, end: TimeTag) -> Vec<DataBlock> {
        find_range(&self.state.read().pointers, point_id, start, end)
    }

    /// Block at `index`, if the table has one
    pub fn block(&self, index: usize) -> Option<DataBlock> {
        self.state.read().pointers.get(index).map(|p| p.handle())
    }

    pub fn block_count(&self) -> usize {
        self.state.read().pointers.len()
    }

    pub fn blocks_used(&self) -> usize {
        self.state
            .read()
            .pointers
            .iter()
            .filter(|p| p.is_allocated())
            .count()
    }

    pub fn blocks_available(&self) -> usize {
        self.state
            .read()
            .pointers
            .iter()
            .filter(|p| !p.is_allocated())
            .count()
    }

    pub fn block_size_kb(&self) -> i32 {
        self.info.block_size_kb
    }

    pub fn info(&self) -> &ArchiveFileInfo {
        &self.info
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn file_start_time(&self) -> TimeTag {
        self.state.read().file_start_time
    }

    pub fn file_end_time(&self) -> TimeTag {
        self.state.read().file_end_time
    }

    pub fn points_received(&self) -> i32 {
        self.state.read().points_received
    }

    pub fn points_archived(&self) -> i32 {
        self.state.read().points_archived
    }

    /// Count `samples` more samples received. Persisted on the next save.
    pub fn record_received(&self, samples: i32) -> Result<()> {
        let mut state = self.state.write();
        state.points_received = Self::advance(state.points_received, samples, "points received")?;
        Ok(())
    }

    /// Count one sample archived at `sample_time`, widening the file end time.
    /// Persisted on the next save.
    pub fn record_archived(&self, sample_time: TimeTag) -> Result<()> {
        let mut state = self.state.write();
        state.points_archived = Self::advance(state.points_archived, 1, "points archived")?;
        if sample_time > state.file_end_time {
            state.file_end_time = sample_time;
        }
        Ok(())
    }

    pub fn set_points_received(&self, value: i32) -> Result<()> {
        let mut state = self.state.write();
        state.points_received = Self::raise_to(state.points_received, value, "points received")?;
        Ok(())
    }

    pub fn set_points_archived(&self, value: i32) -> Result<()> {
        let mut state = self.state.write();
        state.points_archived = Self::raise_to(state.points_archived, value, "points archived")?;
        Ok(())
    }

    fn advance(current: i32, by: i32, what: &str) -> Result<i32> {
        if by < 0 {
            return Err(Error::Range(format!("{} cannot decrease by {}", what, -by)));
        }
        current
            .checked_add(by)
            .ok_or_else(|| Error::Range(format!("{} overflows", what)))
    }

    fn raise_to(current: i32, value: i32, what: &str) -> Result<i32> {
        if value < current {
            return Err(Error::Range(format!(
                "{} cannot go from {} down to {}",
                what, current, value
            )));
        }
        Ok(value)
    }

    /// Snapshot of the trailer fields and block usage
    pub fn summary(&self) -> TableSummary {
        let state = self.state.read();
        let blocks_used = state.pointers.iter().filter(|p| p.is_allocated()).count();
        TableSummary {
            file_start_time: state.file_start_time,
            file_end_time: state.file_end_time,
            points_received: state.points_received,
            points_archived: state.points_archived,
            block_size_kb: self.info.block_size_kb,
            block_count: state.pointers.len(),
            blocks_used,
            blocks_available: state.pointers.len() - blocks_used,
        }
    }

    /// Give back the stream and payload
    pub fn into_parts(self) -> (S, P) {
        (self.io.into_inner().stream, self.payload)
    }
}
