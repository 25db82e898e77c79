//! CLI commands

use crate::archive::ArchiveFile;
use crate::config::ArchiveConfig;
use crate::core::{PointId, TimeTag};
use crate::error::Result;
use crate::storage::FileType;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// Historian-Archive CLI
#[derive(Parser)]
#[command(name = "historian-archive")]
#[command(about = "Inspect and maintain time-series archive files")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Treat the archive as a historic (growable) file
    #[arg(long, global = true)]
    pub historic: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new, empty archive file
    Create {
        /// Archive file path
        path: PathBuf,
        /// Block size in KiB
        #[arg(short, long)]
        block_size_kb: Option<i32>,
        /// Data region size in KiB
        #[arg(long)]
        capacity_kb: Option<u64>,
    },
    /// Print the allocation table summary
    Info {
        /// Archive file path
        path: PathBuf,
    },
    /// Request a block for a point
    Allocate {
        /// Archive file path
        path: PathBuf,
        /// Point ID
        #[arg(short, long)]
        point: i32,
        /// Sample time in seconds since 1995-01-01 UTC
        #[arg(short, long)]
        time: f64,
        /// Index of the block last used by this point
        #[arg(long)]
        hint: Option<usize>,
    },
    /// List the blocks of a point within a time range
    Query {
        /// Archive file path
        path: PathBuf,
        /// Point ID
        #[arg(short, long)]
        point: i32,
        /// Range start in seconds since 1995-01-01 UTC
        #[arg(long)]
        start: Option<f64>,
        /// Range end in seconds since 1995-01-01 UTC
        #[arg(long)]
        end: Option<f64>,
    },
    /// Append free blocks to the archive
    Extend {
        /// Archive file path
        path: PathBuf,
        /// Number of blocks to add
        #[arg(short, long, default_value = "1")]
        blocks: usize,
    },
}

impl Cli {
    /// Resolve the archive configuration from the config file and flags
    pub fn archive_config(&self) -> Result<ArchiveConfig> {
        let mut config = match &self.config {
            Some(path) => ArchiveConfig::load(path)?,
            None => ArchiveConfig::default(),
        };
        if self.historic {
            config.file_type = FileType::Historic;
        }
        if let Commands::Create {
            block_size_kb,
            capacity_kb,
            ..
        } = &self.command
        {
            if let Some(size) = block_size_kb {
                config.block_size_kb = *size;
            }
            if let Some(capacity) = capacity_kb {
                config.initial_capacity_kb = *capacity;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// Execute a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.archive_config()?;

    match cli.command {
        Commands::Create { path, .. } => {
            let archive = ArchiveFile::create(&path, &config)?;
            print_json(&archive.table().summary())?;
            archive.close()
        }
        Commands::Info { path } => {
            let archive = ArchiveFile::open(&path, &config)?;
            print_json(&archive.table().summary())
        }
        Commands::Allocate {
            path,
            point,
            time,
            hint,
        } => {
            let archive = ArchiveFile::open(&path, &config)?;
            let block =
                archive
                    .table()
                    .request_block(PointId::new(point)?, TimeTag::new(time)?, hint)?;
            print_json(&block)?;
            archive.close()
        }
        Commands::Query {
            path,
            point,
            start,
            end,
        } => {
            let archive = ArchiveFile::open(&path, &config)?;
            let start = start.map(TimeTag::new).transpose()?.unwrap_or(TimeTag::MIN);
            let end = end.map(TimeTag::new).transpose()?.unwrap_or(TimeTag::MAX);
            let blocks = archive.table().find_all(PointId::new(point)?, start, end);
            print_json(&blocks)
        }
        Commands::Extend { path, blocks } => {
            let archive = ArchiveFile::open(&path, &config)?;
            let added = archive.table().extend(blocks)?;
            print_json(&added)?;
            archive.close()
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_and_resolve_config() {
        let cli = Cli::parse_from([
            "historian-archive",
            "--historic",
            "create",
            "archive.d",
            "--block-size-kb",
            "4",
            "--capacity-kb",
            "64",
        ]);
        let config = cli.archive_config().unwrap();
        assert_eq!(config.block_size_kb, 4);
        assert_eq!(config.initial_capacity_kb, 64);
        assert_eq!(config.file_type, FileType::Historic);
    }

    #[test]
    fn test_create_allocate_query() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cli.d");
        let path_arg = path.to_str().unwrap();

        run(Cli::parse_from([
            "historian-archive",
            "create",
            path_arg,
            "--block-size-kb",
            "1",
            "--capacity-kb",
            "8",
        ]))
        .unwrap();
        run(Cli::parse_from([
            "historian-archive",
            "allocate",
            path_arg,
            "--point",
            "3",
            "--time",
            "500",
        ]))
        .unwrap();
        run(Cli::parse_from(["historian-archive", "extend", path_arg, "--blocks", "2"])).unwrap();
        run(Cli::parse_from(["historian-archive", "query", path_arg, "--point", "3"])).unwrap();

        let archive = ArchiveFile::open(&path, &ArchiveConfig::default()).unwrap();
        assert_eq!(archive.table().block_count(), 10);
        assert_eq!(archive.table().blocks_used(), 1);
        assert_eq!(
            archive.table().find_last(PointId::new(3).unwrap()).unwrap().start_time,
            TimeTag::new(500.0).unwrap()
        );
    }
}
