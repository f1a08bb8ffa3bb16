//! Fakes shared by unit tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, MediaOpsError};
use crate::media::{Chapter, MediaMetadata, MetadataProbe, StepExecutor, StepOutcome, StepRequest};
use crate::operations::{OperationResult, ProgressReporter, ProgressUpdate};

/// Step executor that counts calls, can fail chosen calls, panic, or wait on a gate
#[derive(Default)]
pub struct FakeExecutor {
    calls: AtomicUsize,
    failing: HashSet<usize>,
    panic_on: Option<usize>,
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<StepRequest>>,
}

impl FakeExecutor {
    /// Fail the given 1-based calls
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            failing: calls.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn panicking_on(call: usize) -> Self {
        Self {
            panic_on: Some(call),
            ..Default::default()
        }
    }

    /// Every step waits for one permit (or cancellation) before finishing
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for FakeExecutor {
    async fn execute_step(
        &self,
        request: &StepRequest,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            tokio::select! {
                permit = gate.acquire() => permit.expect("gate closed").forget(),
                _ = cancel.cancelled() => return Err(MediaOpsError::Cancelled),
            }
        }

        if self.panic_on == Some(call) {
            panic!("executor crashed on call {}", call);
        }

        if self.failing.contains(&call) {
            return Ok(StepOutcome::failed(format!("call {} failed", call)));
        }

        Ok(StepOutcome::succeeded(request.output_path.clone()))
    }
}

/// Probe returning fixed metadata for any path
pub struct FakeProbe {
    metadata: MediaMetadata,
}

impl FakeProbe {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            metadata: MediaMetadata {
                duration,
                chapters: Vec::new(),
                format_name: Some("mp4".to_string()),
                size: None,
            },
        }
    }

    pub fn with_chapters(titles: &[&str], chapter_seconds: f64) -> Self {
        let chapters: Vec<Chapter> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| Chapter {
                index: i as u32 + 1,
                title: title.to_string(),
                start: i as f64 * chapter_seconds,
                end: (i + 1) as f64 * chapter_seconds,
            })
            .collect();

        Self {
            metadata: MediaMetadata {
                duration: titles.len() as f64 * chapter_seconds,
                chapters,
                format_name: Some("mp4".to_string()),
                size: None,
            },
        }
    }
}

#[async_trait]
impl MetadataProbe for FakeProbe {
    async fn probe(&self, _path: &Path) -> Result<MediaMetadata> {
        Ok(self.metadata.clone())
    }
}

/// Reporter that keeps every message it receives
#[derive(Default)]
pub struct RecordingReporter {
    updates: Mutex<Vec<ProgressUpdate>>,
    completion: Mutex<Option<OperationResult>>,
    error: Mutex<Option<String>>,
}

impl RecordingReporter {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn completion(&self) -> Option<OperationResult> {
        self.completion.lock().unwrap().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report_progress(&self, update: ProgressUpdate) -> bool {
        self.updates.lock().unwrap().push(update);
        true
    }

    fn report_error(&self, _operation_id: &str, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    fn report_completion(&self, _operation_id: &str, result: OperationResult) {
        *self.completion.lock().unwrap() = Some(result);
    }
}

/// Media file on disk the launcher can canonicalize
pub fn media_file(dir: &assert_fs::TempDir, name: &str) -> std::path::PathBuf {
    use assert_fs::prelude::*;

    let file = dir.child(name);
    file.write_binary(b"\x00\x00\x00\x18ftypmp42").unwrap();
    file.path().to_path_buf()
}
