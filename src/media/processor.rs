use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn};

use crate::config::MediaConfig;
use crate::error::{Result, MediaOpsError};
use super::{
    Chapter, MediaCommandBuilder, MediaMetadata, MetadataProbe, StepExecutor, StepOutcome,
    StepRequest,
};

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeChapter {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    chapters: Vec<FfprobeChapter>,
}

fn parse_seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Parse `ffprobe -show_format -show_chapters` JSON output
pub fn parse_ffprobe_json(json: &str) -> Result<MediaMetadata> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| MediaOpsError::Probe(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let format = output.format.as_ref();
    let duration = format
        .and_then(|f| parse_seconds(f.duration.as_ref()))
        .unwrap_or(0.0);
    let size = format
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<u64>().ok());
    let format_name = format.and_then(|f| f.format_name.clone());

    let chapters = output
        .chapters
        .iter()
        .enumerate()
        .filter_map(|(i, chapter)| {
            let start = parse_seconds(chapter.start_time.as_ref())?;
            let end = parse_seconds(chapter.end_time.as_ref())?;
            let index = i as u32 + 1;
            let title = chapter
                .tags
                .get("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Chapter {}", index));
            Some(Chapter { index, title, start, end })
        })
        .collect();

    Ok(MediaMetadata {
        duration,
        chapters,
        format_name,
        size,
    })
}

/// ffmpeg/ffprobe backed implementation of the media collaborators
pub struct FfmpegProcessor {
    config: MediaConfig,
    ffmpeg: MediaCommandBuilder,
    ffprobe: MediaCommandBuilder,
}

impl FfmpegProcessor {
    pub fn new(config: MediaConfig) -> Self {
        let ffmpeg = MediaCommandBuilder::new(&config.ffmpeg_path);
        let ffprobe = MediaCommandBuilder::new(&config.ffprobe_path);

        Self {
            config,
            ffmpeg,
            ffprobe,
        }
    }

    /// Check that both ffmpeg and ffprobe can be executed
    pub async fn check_availability(&self) -> Result<()> {
        for builder in [&self.ffmpeg, &self.ffprobe] {
            let output = builder.version_check().execute().await?;
            let version_info = String::from_utf8_lossy(&output.stdout);
            debug!("{}", version_info.lines().next().unwrap_or("Unknown version"));
        }

        info!("Media processor is available");
        Ok(())
    }
}

#[async_trait]
impl MetadataProbe for FfmpegProcessor {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata> {
        debug!("Probing media metadata for {}", path.display());

        let output = self
            .ffprobe
            .probe(path)
            .execute()
            .await
            .map_err(|e| MediaOpsError::Probe(e.to_string()))?;

        let metadata = parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Probed {}: {:.3}s, {} chapters",
            path.display(),
            metadata.duration,
            metadata.chapters.len()
        );
        Ok(metadata)
    }
}

#[async_trait]
impl StepExecutor for FfmpegProcessor {
    async fn execute_step(
        &self,
        request: &StepRequest,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome> {
        let command = self.ffmpeg.segment(
            request.source.as_path(),
            request.start,
            request.duration,
            request.output_path.as_path(),
            &self.config.output_options,
        );

        match command.run(cancel, self.config.step_timeout()).await {
            Ok(_) if request.output_path.exists() => {
                Ok(StepOutcome::succeeded(request.output_path.clone()))
            }
            Ok(_) => Ok(StepOutcome::failed(format!(
                "ffmpeg reported success but {} was not written",
                request.output_path.display()
            ))),
            Err(e @ (MediaOpsError::Cancelled | MediaOpsError::Timeout(_))) => {
                // The child was killed mid-write
                discard_partial_output(&request.output_path).await;
                match e {
                    MediaOpsError::Cancelled => Err(e),
                    _ => {
                        warn!("Segment {} failed: {}", request.output_path.display(), e);
                        Ok(StepOutcome::failed(e.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!("Segment {} failed: {}", request.output_path.display(), e);
                Ok(StepOutcome::failed(e.to_string()))
            }
        }
    }
}

async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
