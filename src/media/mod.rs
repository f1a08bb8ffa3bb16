// Media collaborators consumed by the operation tracker:
// - MetadataProbe: duration and chapter discovery (ffprobe)
// - StepExecutor: performs one split step (ffmpeg)
// - Commands: command builders shared by both

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// 1-based position in the container's chapter list
    pub index: u32,
    pub title: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    /// Container duration in seconds
    pub duration: f64,
    pub chapters: Vec<Chapter>,
    pub format_name: Option<String>,
    pub size: Option<u64>,
}

/// Input for a single unit of split work
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub source: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub output_path: PathBuf,
}

/// Result of a single unit of split work
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub output_files: Vec<PathBuf>,
}

impl StepOutcome {
    pub fn succeeded(output: PathBuf) -> Self {
        Self {
            success: true,
            error: None,
            output_files: vec![output],
        }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            output_files: Vec::new(),
        }
    }
}

/// Resolves the basic shape of a media file before any work is scheduled
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata>;
}

/// Performs one step of a multi-step operation.
///
/// Implementations return `Ok` with an unsuccessful outcome for ordinary
/// failures, and `Err(MediaOpsError::Cancelled)` when the token fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(
        &self,
        request: &StepRequest,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Arc<FfmpegProcessor> {
        Arc::new(FfmpegProcessor::new(config))
    }
}
