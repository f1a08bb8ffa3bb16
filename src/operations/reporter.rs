use super::types::{OperationProgress, OperationResult, ProgressUpdate};

/// Write side used by background workers.
///
/// All methods are no-ops once the operation has reached a terminal state.
pub trait ProgressReporter: Send + Sync {
    /// Returns `false` when the update was ignored
    fn report_progress(&self, update: ProgressUpdate) -> bool;

    fn report_error(&self, operation_id: &str, message: &str);

    fn report_completion(&self, operation_id: &str, result: OperationResult);
}

/// Read side used by pollers
pub trait ProgressQuery: Send + Sync {
    fn get(&self, operation_id: &str) -> Option<OperationProgress>;
}
