//! Archive file facade: a file on disk with its allocation table

use crate::config::ArchiveConfig;
use crate::core::point::PointId;
use crate::core::temporal::TimeTag;
use crate::error::Result;
use crate::storage::{AllocationTable, DataBlock, MemoryPayload};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// Archive file backed by `std::fs::File`.
///
/// Sample payloads are tracked in memory only; the file holds the data region
/// and the allocation table.
pub struct ArchiveFile {
    path: PathBuf,
    table: AllocationTable<File, MemoryPayload>,
}

impl ArchiveFile {
    /// Create a new archive file, replacing any file at `path`
    pub fn create<P: AsRef<Path>>(path: P, config: &ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let capacity = config.initial_capacity_bytes();
        let blocks = (capacity / config.file_info().block_size_bytes()) as usize;
        let payload = MemoryPayload::new(config.block_size_kb, blocks);
        let table = AllocationTable::create(file, config.file_info(), capacity, payload)?;

        info!(path = %path.display(), "created archive file");
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Open an existing archive file
    pub fn open<P: AsRef<Path>>(path: P, config: &ArchiveConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // sample capacity follows the block size stored in the file
        let table = AllocationTable::open_with(file, config.file_info(), |trailer| {
            MemoryPayload::new(trailer.block_size_kb, trailer.block_count.max(0) as usize)
        })?;

        info!(path = %path.display(), blocks = table.block_count(), "opened archive file");
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Account for one sample of `point_id`, returning the block it belongs in
    pub fn write_sample(
        &self,
        point_id: PointId,
        sample_time: TimeTag,
        hint: Option<usize>,
    ) -> Result<DataBlock> {
        self.table.record_received(1)?;
        let block = self.table.request_block(point_id, sample_time, hint)?;
        self.table.payload().append(block.index, 1);
        self.table.record_archived(sample_time)?;
        Ok(block)
    }

    /// Persist the table and sync the file to disk
    pub fn close(self) -> Result<()> {
        self.table.save()?;
        let (file, _) = self.table.into_parts();
        file.sync_all()?;
        Ok(())
    }

    pub fn table(&self) -> &AllocationTable<File, MemoryPayload> {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::FileType;
    use tempfile::TempDir;

    fn config(file_type: FileType) -> ArchiveConfig {
        ArchiveConfig {
            block_size_kb: 1,
            initial_capacity_kb: 4,
            file_type,
            cache_writes: false,
        }
    }

    fn tag(secs: f64) -> TimeTag {
        TimeTag::new(secs).unwrap()
    }

    #[test]
    fn test_create_write_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("archives").join("active.d");
        let point = PointId::new(42).unwrap();

        let archive = ArchiveFile::create(&path, &config(FileType::Active)).unwrap();
        let mut hint = None;
        for i in 0..5 {
            let block = archive.write_sample(point, tag(1000.0 + f64::from(i)), hint).unwrap();
            hint = Some(block.index);
        }
        assert_eq!(archive.table().blocks_used(), 1);
        archive.close().unwrap();

        let file_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(file_len, 4 * 1024 + 10 + 4 * 12 + 32);

        let archive = ArchiveFile::open(&path, &config(FileType::Active)).unwrap();
        let summary = archive.table().summary();
        assert_eq!(summary.block_count, 4);
        assert_eq!(summary.blocks_used, 1);
        assert_eq!(summary.points_received, 5);
        assert_eq!(summary.points_archived, 5);
        assert_eq!(summary.file_start_time, tag(1000.0));
        assert_eq!(summary.file_end_time, tag(1004.0));
        assert_eq!(archive.table().find_first(point).unwrap().index, 0);
    }

    #[test]
    fn test_historic_file_grows_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("historic.d");
        let archive = ArchiveFile::create(&path, &config(FileType::Historic)).unwrap();

        for id in 0..6 {
            archive
                .write_sample(PointId::new(id).unwrap(), tag(10.0), None)
                .unwrap();
        }
        assert_eq!(archive.table().block_count(), 6);
        archive.close().unwrap();

        let archive = ArchiveFile::open(&path, &config(FileType::Historic)).unwrap();
        assert_eq!(archive.table().block_count(), 6);
        assert_eq!(
            archive.table().block(5).unwrap().point_id,
            PointId::new(5).unwrap()
        );
    }

    #[test]
    fn test_active_file_reports_full() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("active.d");
        let archive = ArchiveFile::create(&path, &config(FileType::Active)).unwrap();

        for id in 0..4 {
            archive
                .write_sample(PointId::new(id).unwrap(), tag(10.0), None)
                .unwrap();
        }
        // Each point still has room in its own block, but a new point has nowhere to go
        let result = archive.write_sample(PointId::new(99).unwrap(), tag(11.0), None);
        assert!(matches!(result, Err(Error::ArchiveFull { block_count: 4 })));
    }

    #[test]
    fn test_open_sizes_payload_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("small-blocks.d");
        ArchiveFile::create(&path, &config(FileType::Active))
            .unwrap()
            .close()
            .unwrap();

        // Default config asks for 8 KiB blocks; the file was made with 1 KiB blocks
        let archive = ArchiveFile::open(&path, &ArchiveConfig::default()).unwrap();
        assert_eq!(archive.table().block_size_kb(), 1);
        assert_eq!(
            archive.table().payload().capacity(),
            1024 / crate::storage::payload::SAMPLE_LEN
        );
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ArchiveFile::open(temp_dir.path().join("nope.d"), &ArchiveConfig::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
