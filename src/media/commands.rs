use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, MediaOpsError};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Seek to a position (seconds) before the next input
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(format_seconds(seconds))
    }

    /// Limit output duration (seconds)
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format_seconds(seconds))
    }

    /// Keep every stream of the first input
    pub fn map_all(self) -> Self {
        self.arg("-map").arg("0")
    }

    /// Copy all streams without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Run the command, honouring cancellation and an optional time limit.
    ///
    /// The child is killed when the token fires or the limit elapses.
    pub async fn run(&self, cancel: &CancellationToken, timeout: Option<Duration>) -> Result<Output> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaOpsError::Media(format!("Failed to execute media processor: {}", e)))?;

        let wait = async {
            let output = match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| MediaOpsError::Timeout(limit))?,
                None => child.wait_with_output().await,
            }
            .map_err(|e| MediaOpsError::Media(format!("{} failed to complete: {}", self.description, e)))?;
            Ok::<_, MediaOpsError>(output)
        };

        let output = tokio::select! {
            result = wait => result?,
            _ = cancel.cancelled() => return Err(MediaOpsError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaOpsError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(output)
    }

    /// Run the command to completion without cancellation
    pub async fn execute(&self) -> Result<Output> {
        self.run(&CancellationToken::new(), None).await
    }
}

/// Fixed millisecond precision keeps generated command lines stable
fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

/// Builder for common media processing operations
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build ffprobe metadata command (format + chapters as JSON)
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Metadata probe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_chapters"])
            .output(path)
    }

    /// Build stream-copy segment extraction command
    pub fn segment<P: AsRef<Path>>(
        &self,
        source: P,
        start: f64,
        duration: f64,
        output_path: P,
        additional_options: &[String],
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(
            &self.binary_path,
            format!("Segment extraction ({:.3}s from {:.3}s)", duration, start),
        )
        .overwrite()
        .seek(start)
        .input(source)
        .duration(duration)
        .map_all()
        .copy_streams()
        .arg("-avoid_negative_ts")
        .arg("make_zero");

        for option in additional_options {
            cmd = cmd.arg(option);
        }

        cmd.output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}
