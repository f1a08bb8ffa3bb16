use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::operations::{SplitOptions, SplitStrategy};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show duration, container format and chapters of a media file
    Info {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Split a media file by chapters or into fixed-length segments
    Split {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Split at chapter boundaries
        #[arg(long, conflicts_with = "segment_seconds")]
        chapters: bool,

        /// Maximum segment length in seconds
        #[arg(short, long, required_unless_present = "chapters")]
        segment_seconds: Option<f64>,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file prefix (defaults to the input's file stem)
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "mediaops.toml")]
        output: PathBuf,
    },
}

/// Resolve split flags into a strategy and naming options
pub fn split_request(
    chapters: bool,
    segment_seconds: Option<f64>,
    output_dir: Option<PathBuf>,
    prefix: Option<String>,
) -> (SplitStrategy, SplitOptions) {
    let strategy = match (chapters, segment_seconds) {
        (false, Some(max_segment_seconds)) => SplitStrategy::Duration { max_segment_seconds },
        _ => SplitStrategy::Chapters,
    };

    (
        strategy,
        SplitOptions {
            output_dir,
            file_prefix: prefix,
        },
    )
}
