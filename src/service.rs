use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ErrorKind, Result, MediaOpsError};
use crate::media::{MediaMetadata, MediaProcessorFactory, MetadataProbe, StepExecutor};
use crate::operations::{
    JobLauncher, OperationProgress, OperationRegistry, OperationStartResult, ProgressQuery,
    RetentionPolicy, SplitOptions, SplitStrategy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Typed success/error envelope returned by every service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl<T> ToolResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(err: &MediaOpsError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }
}

impl<T> From<Result<T>> for ToolResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                debug!("Request failed ({:?}): {}", e.kind(), e);
                Self::fail(&e)
            }
        }
    }
}

/// Split request as received from a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub file_path: String,
    #[serde(flatten)]
    pub split: SplitStrategy,
    #[serde(flatten)]
    pub options: SplitOptions,
}

/// Request surface over the operation tracker and media collaborators
pub struct MediaService {
    launcher: Arc<JobLauncher>,
    probe: Arc<dyn MetadataProbe>,
}

impl MediaService {
    pub fn new(launcher: Arc<JobLauncher>, probe: Arc<dyn MetadataProbe>) -> Self {
        Self { launcher, probe }
    }

    /// Wire the ffmpeg-backed collaborators and a fresh registry
    pub fn from_config(config: &Config) -> Self {
        let processor = MediaProcessorFactory::create_processor(config.media.clone());
        let registry = Arc::new(OperationRegistry::new(RetentionPolicy::from_config(&config.operations)));

        let probe: Arc<dyn MetadataProbe> = processor.clone();
        let executor: Arc<dyn StepExecutor> = processor;
        let launcher = Arc::new(JobLauncher::new(registry, Arc::clone(&probe), executor));

        Self::new(launcher, probe)
    }

    pub fn launcher(&self) -> &Arc<JobLauncher> {
        &self.launcher
    }

    pub async fn split_file(&self, request: SplitRequest) -> ToolResponse<OperationStartResult> {
        self.launcher
            .start_split_job(Path::new(&request.file_path), request.split, request.options)
            .await
            .into()
    }

    pub fn get_operation_progress(&self, operation_id: &str) -> ToolResponse<OperationProgress> {
        self.lookup(operation_id).into()
    }

    /// Request cancellation and return the record as it stands
    pub fn cancel_operation(&self, operation_id: &str) -> ToolResponse<OperationProgress> {
        let result = self.lookup(operation_id).map(|progress| {
            if !self.launcher.cancel(operation_id) {
                warn!("Operation {} is already {:?}", operation_id, progress.status);
            }
            progress
        });
        result.into()
    }

    pub fn list_operations(&self) -> ToolResponse<Vec<OperationProgress>> {
        ToolResponse::ok(self.launcher.registry().list())
    }

    pub async fn get_media_info(&self, file_path: &str) -> ToolResponse<MediaMetadata> {
        self.media_info(file_path).await.into()
    }

    async fn media_info(&self, file_path: &str) -> Result<MediaMetadata> {
        if file_path.trim().is_empty() {
            return Err(MediaOpsError::InvalidArgument("file path is required".to_string()));
        }

        let path = Path::new(file_path);
        let source = fs::canonicalize(path)
            .await
            .map_err(|e| MediaOpsError::from_path_io(path, e))?;
        self.probe.probe(&source).await
    }

    fn lookup(&self, operation_id: &str) -> Result<OperationProgress> {
        if operation_id.trim().is_empty() {
            return Err(MediaOpsError::InvalidArgument("operation id is required".to_string()));
        }

        self.launcher
            .registry()
            .get(operation_id)
            .ok_or_else(|| MediaOpsError::OperationNotFound(operation_id.to_string()))
    }
}
