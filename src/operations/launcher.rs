use dashmap::DashMap;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Result, MediaOpsError};
use crate::media::{MetadataProbe, StepExecutor};
use super::key::{OperationKey, lexical_normalize};
use super::registry::OperationRegistry;
use super::reporter::{ProgressQuery, ProgressReporter};
use super::strategy::{SplitOptions, SplitStep, SplitStrategy};
use super::types::{OperationProgress, OperationStartResult};
use super::worker::SplitWorker;

/// Validates split requests, deduplicates them, and supervises their workers
pub struct JobLauncher {
    registry: Arc<OperationRegistry>,
    probe: Arc<dyn MetadataProbe>,
    executor: Arc<dyn StepExecutor>,
    supervisors: DashMap<String, JoinHandle<()>>,
}

impl JobLauncher {
    pub fn new(
        registry: Arc<OperationRegistry>,
        probe: Arc<dyn MetadataProbe>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        Self {
            registry,
            probe,
            executor,
            supervisors: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Start splitting `file_path`, or join an identical split already in flight.
    ///
    /// Validation, probing and planning failures are returned here and never
    /// create an operation.
    pub async fn start_split_job(
        &self,
        file_path: &Path,
        strategy: SplitStrategy,
        options: SplitOptions,
    ) -> Result<OperationStartResult> {
        if file_path.to_string_lossy().trim().is_empty() {
            return Err(MediaOpsError::InvalidArgument("file path is required".to_string()));
        }

        let source = fs::canonicalize(file_path)
            .await
            .map_err(|e| MediaOpsError::from_path_io(file_path, e))?;
        let file_info = fs::metadata(&source)
            .await
            .map_err(|e| MediaOpsError::from_path_io(&source, e))?;
        if !file_info.is_file() {
            return Err(MediaOpsError::InvalidArgument(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let options = resolve_output_dir(options)?;
        let metadata = self.probe.probe(&source).await?;
        let steps = strategy.plan(&source, &metadata, &options)?;
        let total_steps = steps.len() as u32;

        let key = OperationKey::new(&source, strategy.operation_type(), strategy.key_options(&options));
        let description = format!(
            "Queued {} of {}",
            strategy.operation_type(),
            source.file_name().unwrap_or_default().to_string_lossy()
        );

        let started = self
            .registry
            .start_with_deduplication(&key, total_steps, &description);

        if started.is_new_operation {
            self.spawn_worker(&started.operation_id, source, steps);
        } else {
            info!(
                "Request for {} joined in-flight operation {}",
                source.display(),
                started.operation_id
            );
        }

        Ok(started)
    }

    fn spawn_worker(&self, operation_id: &str, source: PathBuf, steps: Vec<SplitStep>) {
        let cancel = self
            .registry
            .cancellation_token(operation_id)
            .unwrap_or_default();
        let reporter: Arc<dyn ProgressReporter> = self.registry.clone();

        let worker = SplitWorker::new(
            operation_id.to_string(),
            source,
            steps,
            Arc::clone(&self.executor),
            Arc::clone(&reporter),
            cancel,
        );
        let handle = tokio::spawn(worker.run());

        let id = operation_id.to_string();
        let supervisor = tokio::spawn(async move {
            if let Err(e) = handle.await {
                let message = if e.is_panic() {
                    format!("Worker panicked: {}", panic_message(e.into_panic()))
                } else {
                    "Worker task was aborted".to_string()
                };
                error!("Operation {}: {}", id, message);
                reporter.report_error(&id, &message);
            }
        });

        self.supervisors.retain(|_, handle| !handle.is_finished());
        self.supervisors.insert(operation_id.to_string(), supervisor);
        debug!("Spawned worker for operation {}", operation_id);
    }

    /// Wait until the operation's worker has exited and return the final record
    pub async fn wait(&self, operation_id: &str) -> Option<OperationProgress> {
        if let Some((_, supervisor)) = self.supervisors.remove(operation_id) {
            if let Err(e) = supervisor.await {
                error!("Supervisor for operation {} failed: {}", operation_id, e);
            }
        }
        self.registry.get(operation_id)
    }

    pub fn cancel(&self, operation_id: &str) -> bool {
        self.registry.cancel(operation_id)
    }
}

/// Make the output directory absolute so equivalent spellings share one key
fn resolve_output_dir(mut options: SplitOptions) -> Result<SplitOptions> {
    if let Some(dir) = options.output_dir.take() {
        if dir.as_os_str().is_empty() {
            return Err(MediaOpsError::InvalidArgument("output directory is empty".to_string()));
        }
        options.output_dir = Some(lexical_normalize(&std::path::absolute(&dir)?));
    }
    Ok(options)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::media::MockMetadataProbe;
    use crate::operations::types::OperationStatus;
    use crate::test_support::{FakeExecutor, FakeProbe, media_file};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_err, assert_ok};

    fn launcher(probe: impl MetadataProbe + 'static, executor: Arc<FakeExecutor>) -> JobLauncher {
        JobLauncher::new(Arc::new(OperationRegistry::default()), Arc::new(probe), executor)
    }

    fn by_duration(seconds: f64) -> SplitStrategy {
        SplitStrategy::Duration { max_segment_seconds: seconds }
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_request_joins_existing_operation() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate.clone()));
        let launcher = launcher(FakeProbe::with_duration(300.0), executor.clone());

        let first = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();
        let second = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();

        assert!(first.is_new_operation);
        assert!(!second.is_new_operation);
        assert_eq!(first.operation_id, second.operation_id);
        assert_eq!(second.total_steps, 3);

        gate.add_permits(3);
        let done = launcher.wait(&first.operation_id).await.unwrap();
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_finished_operation_is_not_reused() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let executor = Arc::new(FakeExecutor::default());
        let launcher = launcher(FakeProbe::with_duration(200.0), executor.clone());

        let first = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();
        launcher.wait(&first.operation_id).await.unwrap();

        let second = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();
        assert!(second.is_new_operation);
        assert_ne!(second.operation_id, first.operation_id);

        launcher.wait(&second.operation_id).await.unwrap();
        assert_eq!(executor.calls(), 4);
    }

    #[tokio::test]
    async fn test_relative_and_absolute_paths_are_the_same_job() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::Builder::new()
            .prefix("mediaops-path-test")
            .tempdir_in(&cwd)
            .unwrap();
        let absolute = dir.path().join("clip.mp4");
        std::fs::write(&absolute, b"media").unwrap();
        let relative = absolute.strip_prefix(&cwd).unwrap().to_path_buf();

        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate.clone()));
        let launcher = launcher(FakeProbe::with_duration(20.0), executor.clone());

        let first = launcher
            .start_split_job(&relative, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();
        let second = launcher
            .start_split_job(&absolute, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();

        assert!(relative.is_relative());
        assert_eq!(first.operation_id, second.operation_id);
        assert!(!second.is_new_operation);

        gate.add_permits(2);
        launcher.wait(&first.operation_id).await.unwrap();
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_relative_and_absolute_output_dirs_are_the_same_job() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::Builder::new()
            .prefix("mediaops-outdir-test")
            .tempdir_in(&cwd)
            .unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"media").unwrap();
        let relative_out = dir.path().strip_prefix(&cwd).unwrap().join("parts");

        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate.clone()));
        let launcher = launcher(FakeProbe::with_duration(20.0), executor.clone());

        let options = |output_dir: PathBuf| SplitOptions {
            output_dir: Some(output_dir),
            file_prefix: None,
        };
        let first = launcher
            .start_split_job(&file, by_duration(10.0), options(relative_out.join(".")))
            .await
            .unwrap();
        let second = launcher
            .start_split_job(&file, by_duration(10.0), options(cwd.join(&relative_out)))
            .await
            .unwrap();

        assert_eq!(first.operation_id, second.operation_id);
        assert!(!second.is_new_operation);

        gate.add_permits(2);
        launcher.wait(&first.operation_id).await.unwrap();
        assert_eq!(executor.calls(), 2);
        assert!(executor.requests().iter().all(|r| r.output_path.is_absolute()));
    }

    #[tokio::test]
    async fn test_empty_output_dir_is_invalid() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let launcher = launcher(FakeProbe::with_duration(20.0), Arc::new(FakeExecutor::default()));

        let options = SplitOptions {
            output_dir: Some(PathBuf::new()),
            file_prefix: None,
        };
        let err = launcher
            .start_split_job(&file, by_duration(10.0), options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(launcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_polled_progress_is_monotonic() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate.clone()));
        let launcher = launcher(FakeProbe::with_duration(50.0), executor);

        let started = launcher
            .start_split_job(&file, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();

        let mut observed = Vec::new();
        loop {
            let progress = launcher.registry().get(&started.operation_id).unwrap();
            observed.push(progress.current_step);
            if progress.status.is_terminal() {
                break;
            }
            gate.add_permits(1);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(observed.last(), Some(&5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifty_concurrent_submissions_run_once() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate.clone()));
        let launcher = Arc::new(launcher(FakeProbe::with_duration(30.0), executor.clone()));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let launcher = Arc::clone(&launcher);
                let file = file.clone();
                tokio::spawn(async move {
                    launcher
                        .start_split_job(&file, by_duration(10.0), SplitOptions::default())
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(results.len(), 50);
        let ids: HashSet<_> = results.iter().map(|r| r.operation_id.clone()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(results.iter().filter(|r| r.is_new_operation).count(), 1);

        gate.add_permits(3);
        let id = ids.into_iter().next().unwrap();
        let done = launcher.wait(&id).await.unwrap();
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn test_partial_step_failures_complete() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let executor = Arc::new(FakeExecutor::failing_on(&[2, 4]));
        let launcher = launcher(FakeProbe::with_duration(500.0), executor);

        let started = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();
        let done = launcher.wait(&started.operation_id).await.unwrap();

        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.output_files.len(), 3);
    }

    #[tokio::test]
    async fn test_every_step_failing_fails_the_job() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let executor = Arc::new(FakeExecutor::failing_on(&[1, 2]));
        let launcher = launcher(FakeProbe::with_duration(20.0), executor);

        let started = launcher
            .start_split_job(&file, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();
        let done = launcher.wait(&started.operation_id).await.unwrap();

        assert_eq!(done.status, OperationStatus::Failed);
        assert!(done.output_files.is_empty());
    }

    #[tokio::test]
    async fn test_six_hundred_seconds_in_hundred_second_segments() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "lecture.mkv");
        let executor = Arc::new(FakeExecutor::default());
        let launcher = launcher(FakeProbe::with_duration(600.0), executor.clone());

        let started = launcher
            .start_split_job(&file, by_duration(100.0), SplitOptions::default())
            .await
            .unwrap();
        assert_eq!(started.total_steps, 6);

        let done = launcher.wait(&started.operation_id).await.unwrap();
        assert_eq!(done.output_files.len(), 6);
        assert_eq!(done.percent_complete, 100.0);

        let requests = executor.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.start, 500.0);
        assert_eq!(last.duration, 600.0 - 500.0);
        assert!(last.output_path.ends_with("lecture_part06.mkv"));
    }

    #[tokio::test]
    async fn test_three_chapters_split_in_order() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "film.mp4");
        let executor = Arc::new(FakeExecutor::default());
        let launcher = launcher(
            FakeProbe::with_chapters(&["Opening", "Middle", "Ending"], 60.0),
            executor.clone(),
        );

        let started = launcher
            .start_split_job(&file, SplitStrategy::Chapters, SplitOptions::default())
            .await
            .unwrap();
        assert_eq!(started.total_steps, 3);

        let done = launcher.wait(&started.operation_id).await.unwrap();
        assert_eq!(done.operation_type, "split-by-chapters");

        let names: Vec<String> = done
            .output_files
            .iter()
            .map(|f| Path::new(f).file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["film_01_Opening.mp4", "film_02_Middle.mp4", "film_03_Ending.mp4"]);

        let starts: Vec<f64> = executor.requests().iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0.0, 60.0, 120.0]);
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected_synchronously() {
        let dir = assert_fs::TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default());
        let launcher = launcher(FakeProbe::with_duration(60.0), executor.clone());

        let err = launcher
            .start_split_job(&dir.path().join("missing.mp4"), by_duration(10.0), SplitOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(launcher.registry().is_empty());
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_path_is_invalid() {
        let launcher = launcher(FakeProbe::with_duration(60.0), Arc::new(FakeExecutor::default()));
        let err = assert_err!(
            launcher
                .start_split_job(Path::new("  "), by_duration(10.0), SplitOptions::default())
                .await
        );
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_probe_failure_creates_no_operation() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "broken.mp4");

        let mut probe = MockMetadataProbe::new();
        probe
            .expect_probe()
            .times(1)
            .returning(|_| Err(MediaOpsError::Probe("moov atom not found".into())));

        let executor = Arc::new(FakeExecutor::default());
        let launcher = launcher(probe, executor.clone());

        let err = launcher
            .start_split_job(&file, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(launcher.registry().is_empty());
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_file_without_chapters_is_invalid_configuration() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "flat.mp4");
        let launcher = launcher(FakeProbe::with_duration(60.0), Arc::new(FakeExecutor::default()));

        let err = launcher
            .start_split_job(&file, SplitStrategy::Chapters, SplitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaOpsError::InvalidConfiguration(_)));
        assert!(launcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_worker_panic_marks_operation_failed() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let executor = Arc::new(FakeExecutor::panicking_on(2));
        let launcher = launcher(FakeProbe::with_duration(30.0), executor);

        let started = assert_ok!(
            launcher
                .start_split_job(&file, by_duration(10.0), SplitOptions::default())
                .await
        );
        let done = launcher.wait(&started.operation_id).await.unwrap();

        assert_eq!(done.status, OperationStatus::Failed);
        assert!(done.error_message.unwrap().contains("panicked"));
        assert!(done.end_time.is_some());

        let retry = launcher
            .start_split_job(&file, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();
        assert!(retry.is_new_operation);
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_operation() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = media_file(&dir, "talk.mp4");
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(FakeExecutor::default().with_gate(gate));
        let launcher = launcher(FakeProbe::with_duration(40.0), executor.clone());

        let started = launcher
            .start_split_job(&file, by_duration(10.0), SplitOptions::default())
            .await
            .unwrap();

        assert!(launcher.cancel(&started.operation_id));
        let done = launcher.wait(&started.operation_id).await.unwrap();

        assert_eq!(done.status, OperationStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("Operation cancelled"));
        assert!(executor.calls() <= 1);
        assert!(!launcher.cancel(&started.operation_id));
    }
}
