//! Historian-Archive: time-series archive engine
//!
//! Stores timestamped samples of numeric points in a single growable file. The
//! heart of the crate is the file allocation table at the tail of each archive
//! file, which records which point owns each fixed-size data block and when
//! that block starts.
//!
//! # Core Concepts
//!
//! - **Time-tags**: seconds since 1995-01-01 UTC, bounded to 1995..2063
//! - **Blocks**: fixed-size storage units, each owned by a single point
//! - **Allocation table**: the on-disk index of block owners and start times
//! - **Historic / active files**: growable versus fixed-capacity archives
//!
//! # Example
//!
//! ```no_run
//! use historian_archive::prelude::*;
//!
//! # fn example() -> historian_archive::error::Result<()> {
//! let archive = ArchiveFile::create("data/archive.d", &ArchiveConfig::default())?;
//! let point = PointId::new(7)?;
//!
//! let block = archive.write_sample(point, TimeTag::now()?, None)?;
//! let blocks = archive.table().find_all(point, TimeTag::MIN, TimeTag::MAX);
//! assert_eq!(blocks[0].index, block.index);
//! archive.close()?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod storage;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::archive::ArchiveFile;
    pub use crate::config::ArchiveConfig;
    pub use crate::core::*;
    pub use crate::error::{Error, Result};
    pub use crate::storage::*;
}
