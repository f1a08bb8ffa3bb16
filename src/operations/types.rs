use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    /// Completed and Failed never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

/// Snapshot of a tracked operation as seen by pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    pub operation_id: String,
    pub operation_type: String,
    pub status: OperationStatus,
    pub current_step: u32,
    pub total_steps: u32,
    pub percent_complete: f64,
    pub current_operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_seconds_remaining: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub output_files: Vec<String>,
}

impl OperationProgress {
    pub fn new(operation_id: String, operation_type: String, total_steps: u32, description: String) -> Self {
        Self {
            operation_id,
            operation_type,
            status: OperationStatus::Pending,
            current_step: 0,
            total_steps,
            percent_complete: 0.0,
            current_operation: description,
            start_time: Utc::now(),
            end_time: None,
            estimated_seconds_remaining: None,
            error_message: None,
            metadata: BTreeMap::new(),
            output_files: Vec::new(),
        }
    }

    /// Move the step counter forward, never backward and never past the total
    pub(crate) fn advance_to(&mut self, current_step: u32, total_steps: u32) {
        if total_steps > 0 {
            self.total_steps = total_steps;
        }
        self.current_step = current_step.max(self.current_step).min(self.total_steps);
        self.percent_complete = if self.total_steps == 0 {
            0.0
        } else {
            self.current_step as f64 / self.total_steps as f64 * 100.0
        };
    }

    /// `elapsed / current * remaining`, once at least one step has started
    pub(crate) fn refresh_estimate(&mut self, now: DateTime<Utc>) {
        if self.current_step == 0 {
            self.estimated_seconds_remaining = None;
            return;
        }

        let elapsed = (now - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let remaining = self.total_steps.saturating_sub(self.current_step) as f64;
        self.estimated_seconds_remaining = Some(elapsed / self.current_step as f64 * remaining);
    }
}

/// Returned synchronously when a job is submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStartResult {
    pub operation_id: String,
    pub is_new_operation: bool,
    pub message: String,
    pub total_steps: u32,
}

/// Worker → registry progress message
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub operation_id: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub current_operation: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Worker → registry completion message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub output_files: Vec<String>,
}
