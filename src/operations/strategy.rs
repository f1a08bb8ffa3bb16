use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use crate::error::{Result, MediaOpsError};
use crate::media::MediaMetadata;

/// How a file is cut into steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum SplitStrategy {
    /// One output per container chapter
    Chapters,
    /// Fixed-length segments; the last one takes the remainder
    Duration {
        #[serde(rename = "maxSegmentSeconds")]
        max_segment_seconds: f64,
    },
}

/// Caller-controlled naming of split outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOptions {
    /// Defaults to the source file's directory
    pub output_dir: Option<PathBuf>,
    /// Defaults to the source file's stem
    pub file_prefix: Option<String>,
}

/// One planned unit of split work
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStep {
    /// 1-based; drives output numbering
    pub index: u32,
    pub title: Option<String>,
    pub start: f64,
    pub duration: f64,
    pub output_path: PathBuf,
    pub description: String,
}

impl SplitStrategy {
    pub fn operation_type(&self) -> &'static str {
        match self {
            SplitStrategy::Chapters => "split-by-chapters",
            SplitStrategy::Duration { .. } => "split-by-duration",
        }
    }

    pub fn step_count(&self, metadata: &MediaMetadata) -> u32 {
        match self {
            SplitStrategy::Chapters => metadata.chapters.len() as u32,
            SplitStrategy::Duration { max_segment_seconds } => {
                match (whole_millis(metadata.duration), whole_millis(*max_segment_seconds)) {
                    (Some(total), Some(max)) => u32::try_from(total.div_ceil(max)).unwrap_or(u32::MAX),
                    _ => 0,
                }
            }
        }
    }

    /// `(start, duration)` in seconds for the 1-based step `index`
    pub fn step_bounds(&self, metadata: &MediaMetadata, index: u32) -> Option<(f64, f64)> {
        if index == 0 || index > self.step_count(metadata) {
            return None;
        }

        match self {
            SplitStrategy::Chapters => {
                let chapter = metadata.chapters.get(index as usize - 1)?;
                Some((chapter.start, (chapter.end - chapter.start).max(0.0)))
            }
            SplitStrategy::Duration { max_segment_seconds } => {
                let start = (index - 1) as f64 * max_segment_seconds;
                Some((start, max_segment_seconds.min(metadata.duration - start).max(0.0)))
            }
        }
    }

    /// Value hashed into the operation key alongside path and type
    pub fn key_options(&self, options: &SplitOptions) -> Value {
        json!({ "split": self, "options": options })
    }

    /// Expand the strategy into ordered steps for `source`
    pub fn plan(&self, source: &Path, metadata: &MediaMetadata, options: &SplitOptions) -> Result<Vec<SplitStep>> {
        let total = self.step_count(metadata);
        if total == 0 {
            return Err(MediaOpsError::InvalidConfiguration(match self {
                SplitStrategy::Chapters => format!("{} has no chapters", source.display()),
                SplitStrategy::Duration { max_segment_seconds } => format!(
                    "cannot split {:.3}s of media into segments of {}s",
                    metadata.duration, max_segment_seconds
                ),
            }));
        }

        let naming = OutputNaming::resolve(source, options)?;

        (1..=total)
            .map(|index| -> Result<SplitStep> {
                let (start, duration) = self.step_bounds(metadata, index).ok_or_else(|| {
                    MediaOpsError::InvalidConfiguration(format!("step {} is out of range", index))
                })?;

                let step = match self {
                    SplitStrategy::Chapters => {
                        let title = metadata.chapters[index as usize - 1].title.clone();
                        SplitStep {
                            index,
                            output_path: naming.chapter(index, &title),
                            description: format!("Processing chapter {}/{}: {}", index, total, title),
                            title: Some(title),
                            start,
                            duration,
                        }
                    }
                    SplitStrategy::Duration { .. } => SplitStep {
                        index,
                        title: None,
                        start,
                        duration,
                        output_path: naming.segment(index),
                        description: format!(
                            "Processing segment {}/{} ({:.1}s - {:.1}s)",
                            index,
                            total,
                            start,
                            start + duration
                        ),
                    },
                };
                Ok(step)
            })
            .collect()
    }
}

/// Seconds rounded to whole milliseconds, the precision of generated command lines.
///
/// Counting in integers keeps `2.1 / 0.7` at three segments instead of four.
fn whole_millis(seconds: f64) -> Option<u64> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    (millis >= 1.0).then_some(millis as u64)
}

struct OutputNaming {
    dir: PathBuf,
    prefix: String,
    extension: Option<String>,
}

impl OutputNaming {
    fn resolve(source: &Path, options: &SplitOptions) -> Result<Self> {
        let dir = match &options.output_dir {
            Some(dir) => dir.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| MediaOpsError::InvalidArgument("Cannot determine output directory".to_string()))?,
        };

        let prefix = match &options.file_prefix {
            Some(prefix) => {
                let prefix = prefix.trim();
                if prefix.is_empty() || prefix.contains(['/', '\\']) {
                    return Err(MediaOpsError::InvalidArgument(format!(
                        "Invalid file prefix '{}'",
                        prefix
                    )));
                }
                prefix.to_string()
            }
            None => source
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .ok_or_else(|| MediaOpsError::InvalidArgument("Invalid media filename".to_string()))?,
        };

        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().to_string());

        Ok(Self { dir, prefix, extension })
    }

    fn file(&self, stem: String) -> PathBuf {
        match &self.extension {
            Some(ext) => self.dir.join(format!("{}.{}", stem, ext)),
            None => self.dir.join(stem),
        }
    }

    fn segment(&self, index: u32) -> PathBuf {
        self.file(format!("{}_part{:02}", self.prefix, index))
    }

    fn chapter(&self, index: u32, title: &str) -> PathBuf {
        self.file(format!("{}_{:02}_{}", self.prefix, index, sanitize_title(title)))
    }
}

/// Filesystem-safe rendition of a chapter title
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();

    let collapsed = cleaned
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let truncated: String = collapsed.chars().take(64).collect();
    if truncated.is_empty() {
        "chapter".to_string()
    } else {
        truncated
    }
}
