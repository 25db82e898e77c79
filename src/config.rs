//! Archive configuration

use crate::error::{Error, Result};
use crate::storage::stream::{ArchiveFileInfo, FileType};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings used when creating or opening an archive file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Size of one data block in KiB
    pub block_size_kb: i32,
    /// Data region size of a newly created file in KiB
    pub initial_capacity_kb: u64,
    pub file_type: FileType,
    /// Leave table writes in OS buffers instead of flushing each one
    pub cache_writes: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            block_size_kb: 8,
            initial_capacity_kb: 100 * 1024,
            file_type: FileType::Active,
            cache_writes: false,
        }
    }
}

impl ArchiveConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size_kb < 1 {
            return Err(Error::Configuration(format!(
                "block_size_kb must be at least 1, got {}",
                self.block_size_kb
            )));
        }
        if self.initial_capacity_kb < self.block_size_kb as u64 && self.file_type == FileType::Active
        {
            return Err(Error::Configuration(format!(
                "active file of {} KiB cannot hold a single {} KiB block",
                self.initial_capacity_kb, self.block_size_kb
            )));
        }
        Ok(())
    }

    /// Data region size of a newly created file in bytes
    pub fn initial_capacity_bytes(&self) -> u64 {
        self.initial_capacity_kb * 1024
    }

    pub fn file_info(&self) -> ArchiveFileInfo {
        ArchiveFileInfo {
            block_size_kb: self.block_size_kb,
            file_type: self.file_type,
            cache_writes: self.cache_writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ArchiveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.file_info().block_size_kb, 8);
        assert_eq!(config.initial_capacity_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_load_partial_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("archive.json");
        std::fs::write(&path, r#"{"block_size_kb": 16, "file_type": "historic"}"#).unwrap();

        let config = ArchiveConfig::load(&path).unwrap();
        assert_eq!(config.block_size_kb, 16);
        assert_eq!(config.file_type, FileType::Historic);
        assert!(!config.cache_writes);
        assert_eq!(config.initial_capacity_kb, ArchiveConfig::default().initial_capacity_kb);
    }

    #[test]
    fn test_invalid_block_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("archive.json");
        std::fs::write(&path, r#"{"block_size_kb": 0}"#).unwrap();

        assert!(matches!(
            ArchiveConfig::load(&path),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_active_file_needs_one_block() {
        let config = ArchiveConfig {
            block_size_kb: 64,
            initial_capacity_kb: 32,
            ..ArchiveConfig::default()
        };
        assert!(config.validate().is_err());

        let historic = ArchiveConfig {
            file_type: FileType::Historic,
            ..config
        };
        historic.validate().unwrap();
    }
}
