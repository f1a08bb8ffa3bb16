use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, error};

use crate::error::{Result, MediaOpsError};
use crate::media::{StepExecutor, StepRequest};
use super::reporter::ProgressReporter;
use super::strategy::SplitStep;
use super::types::{OperationResult, ProgressUpdate};

/// Runs the planned steps of one split operation, in order, on its own task
pub struct SplitWorker {
    operation_id: String,
    source: PathBuf,
    steps: Vec<SplitStep>,
    executor: Arc<dyn StepExecutor>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl SplitWorker {
    pub fn new(
        operation_id: String,
        source: PathBuf,
        steps: Vec<SplitStep>,
        executor: Arc<dyn StepExecutor>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            operation_id,
            source,
            steps,
            executor,
            reporter,
            cancel,
        }
    }

    /// Drive the operation to a terminal state
    pub async fn run(self) {
        info!(
            "Operation {} started: {} steps for {}",
            self.operation_id,
            self.steps.len(),
            self.source.display()
        );

        match self.execute_steps().await {
            Ok(result) => {
                info!("Operation {}: {}", self.operation_id, result.message);
                self.reporter.report_completion(&self.operation_id, result);
            }
            Err(e) => {
                error!("Operation {} aborted: {}", self.operation_id, e);
                self.reporter.report_error(&self.operation_id, &e.to_string());
            }
        }
    }

    async fn execute_steps(&self) -> Result<OperationResult> {
        let total = self.steps.len() as u32;
        let mut output_files: Vec<String> = Vec::new();

        for dir in self.output_dirs() {
            fs::create_dir_all(&dir).await?;
        }

        for step in &self.steps {
            if self.cancel.is_cancelled() {
                return Err(MediaOpsError::Cancelled);
            }

            let mut metadata = BTreeMap::new();
            metadata.insert("stepStart".to_string(), Value::from(step.start));
            metadata.insert("stepDuration".to_string(), Value::from(step.duration));
            metadata.insert(
                "stepOutput".to_string(),
                Value::String(step.output_path.display().to_string()),
            );

            self.reporter.report_progress(ProgressUpdate {
                operation_id: self.operation_id.clone(),
                current_step: step.index,
                total_steps: total,
                current_operation: step.description.clone(),
                metadata,
            });

            let request = StepRequest {
                source: self.source.clone(),
                start: step.start,
                duration: step.duration,
                output_path: step.output_path.clone(),
            };

            match self.executor.execute_step(&request, &self.cancel).await {
                Ok(outcome) if outcome.success => {
                    output_files.extend(
                        outcome
                            .output_files
                            .iter()
                            .map(|path| path.display().to_string()),
                    );
                }
                Ok(outcome) => {
                    warn!(
                        "Operation {}: step {}/{} failed, skipping: {}",
                        self.operation_id,
                        step.index,
                        total,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Err(MediaOpsError::Cancelled) => return Err(MediaOpsError::Cancelled),
                Err(e) => {
                    warn!(
                        "Operation {}: step {}/{} failed, skipping: {}",
                        self.operation_id, step.index, total, e
                    );
                }
            }
        }

        let success = !output_files.is_empty();
        let message = if success {
            format!("Split into {} file(s)", output_files.len())
        } else {
            "No output files were produced".to_string()
        };

        Ok(OperationResult {
            success,
            message,
            output_files,
        })
    }

    fn output_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .steps
            .iter()
            .filter_map(|step| step.output_path.parent().map(PathBuf::from))
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();
        dirs.dedup();
        dirs
    }
}
