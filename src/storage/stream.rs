//! The byte stream and file properties an allocation table persists against

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};

/// Byte stream owned by an archive file.
///
/// The allocation table never opens or closes it; it only seeks, reads, writes
/// and flushes.
pub trait ArchiveStream: Read + Write + Seek + Send {
    /// Current length of the stream in bytes
    fn current_len(&mut self) -> io::Result<u64>;
}

impl ArchiveStream for File {
    fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl ArchiveStream for Cursor<Vec<u8>> {
    fn current_len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

/// Role of an archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Append-friendly file that grows one block at a time when full
    Historic,
    /// Fixed-capacity file that fails allocation instead of growing
    #[default]
    Active,
}

/// Properties of the owning archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFileInfo {
    /// Size of one data block in KiB
    pub block_size_kb: i32,
    pub file_type: FileType,
    /// When set, table writes are left in OS buffers instead of flushed
    pub cache_writes: bool,
}

impl ArchiveFileInfo {
    /// Size of one data block in bytes
    pub fn block_size_bytes(&self) -> u64 {
        self.block_size_kb.max(0) as u64 * 1024
    }

    pub fn is_historic(&self) -> bool {
        self.file_type == FileType::Historic
    }
}
