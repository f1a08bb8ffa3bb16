// Long-running operation tracking:
// - Key: content digest used to deduplicate identical requests
// - Registry: concurrent operation table and digest index
// - Reporter: write/read interfaces over operation progress
// - Strategy: how a file is cut into ordered steps
// - Worker: sequential step execution on a background task
// - Launcher: validation, dedup decision and supervised spawning

pub mod key;
pub mod launcher;
pub mod registry;
pub mod reporter;
pub mod strategy;
pub mod types;
pub mod worker;

pub use key::OperationKey;
pub use launcher::JobLauncher;
pub use registry::{OperationRegistry, RetentionPolicy};
pub use reporter::{ProgressQuery, ProgressReporter};
pub use strategy::{SplitOptions, SplitStep, SplitStrategy};
pub use types::{
    OperationProgress, OperationResult, OperationStartResult, OperationStatus, ProgressUpdate,
};
pub use worker::SplitWorker;
