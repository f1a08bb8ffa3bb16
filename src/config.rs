use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::error::{Result, MediaOpsError};

fn default_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub media: MediaConfig,
    pub operations: OperationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Upper bound for a single split step in seconds (0 = unbounded)
    pub step_timeout_secs: u64,
    /// Additional ffmpeg arguments appended before each output path
    /// Example: ["-map_metadata", "-1"]
    pub output_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// How long finished operations stay queryable, in seconds
    pub retention_secs: u64,
    /// Upper bound on finished operations kept in memory
    pub max_retained_operations: usize,
    /// Poll interval used by the CLI while waiting on a job
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media: MediaConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                step_timeout_secs: 0,
                output_options: vec![],
            },
            operations: OperationsConfig {
                retention_secs: 3600,
                max_retained_operations: 1000,
                poll_interval_ms: default_poll_interval_ms(),
            },
        }
    }
}

impl MediaConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_secs > 0).then(|| Duration::from_secs(self.step_timeout_secs))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MediaOpsError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| MediaOpsError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MediaOpsError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MediaOpsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
