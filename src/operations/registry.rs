use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OperationsConfig;
use super::key::OperationKey;
use super::reporter::{ProgressQuery, ProgressReporter};
use super::types::{
    OperationProgress, OperationResult, OperationStartResult, OperationStatus, ProgressUpdate,
};

/// How long finished operations remain queryable
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub ttl: chrono::Duration,
    pub max_retained: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(1),
            max_retained: 1000,
        }
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &OperationsConfig) -> Self {
        Self {
            ttl: chrono::Duration::seconds(config.retention_secs.min(u32::MAX as u64) as i64),
            max_retained: config.max_retained_operations,
        }
    }
}

struct OperationEntry {
    progress: OperationProgress,
    digest: String,
    cancel: CancellationToken,
}

/// In-memory table of operations plus the digest index used for deduplication.
///
/// Lock order is always `active_keys` then `operations`; no method holds an
/// `operations` guard while touching `active_keys`.
pub struct OperationRegistry {
    operations: DashMap<String, OperationEntry>,
    active_keys: DashMap<String, String>,
    retention: RetentionPolicy,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl OperationRegistry {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            operations: DashMap::new(),
            active_keys: DashMap::new(),
            retention,
        }
    }

    /// Return the in-flight operation for `key`, or register a new Pending one.
    ///
    /// The check and the insert happen under the digest's entry lock, so
    /// concurrent callers with the same key agree on a single winner.
    pub fn start_with_deduplication(
        &self,
        key: &OperationKey,
        total_steps: u32,
        description: &str,
    ) -> OperationStartResult {
        self.evict_expired();
        let digest = key.digest();

        match self.active_keys.entry(digest.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing_id = occupied.get().clone();
                let in_flight = self.operations.get(&existing_id).and_then(|entry| {
                    (!entry.progress.status.is_terminal()).then_some(entry.progress.total_steps)
                });

                if let Some(existing_total) = in_flight {
                    debug!("Joining in-flight operation {} for {}", existing_id, key.file_path());
                    return OperationStartResult {
                        operation_id: existing_id.clone(),
                        is_new_operation: false,
                        message: format!(
                            "An identical operation is already in progress ({})",
                            existing_id
                        ),
                        total_steps: existing_total,
                    };
                }

                let operation_id = self.insert_operation(key, digest, total_steps, description);
                debug!("Replacing stale mapping {} with {}", existing_id, operation_id);
                occupied.insert(operation_id.clone());
                self.started(operation_id, total_steps)
            }
            Entry::Vacant(vacant) => {
                let operation_id = self.insert_operation(key, digest, total_steps, description);
                vacant.insert(operation_id.clone());
                self.started(operation_id, total_steps)
            }
        }
    }

    fn insert_operation(
        &self,
        key: &OperationKey,
        digest: String,
        total_steps: u32,
        description: &str,
    ) -> String {
        let operation_id = Uuid::new_v4().to_string();
        let progress = OperationProgress::new(
            operation_id.clone(),
            key.operation_type().to_string(),
            total_steps,
            description.to_string(),
        );

        self.operations.insert(
            operation_id.clone(),
            OperationEntry {
                progress,
                digest,
                cancel: CancellationToken::new(),
            },
        );

        info!("Registered operation {} ({}, {} steps)", operation_id, key.operation_type(), total_steps);
        operation_id
    }

    fn started(&self, operation_id: String, total_steps: u32) -> OperationStartResult {
        OperationStartResult {
            message: format!("Operation {} started with {} steps", operation_id, total_steps),
            operation_id,
            is_new_operation: true,
            total_steps,
        }
    }

    /// Snapshot of every retained operation, oldest first
    pub fn list(&self) -> Vec<OperationProgress> {
        let mut all: Vec<_> = self
            .operations
            .iter()
            .map(|entry| entry.progress.clone())
            .collect();
        all.sort_by_key(|p| p.start_time);
        all
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn cancellation_token(&self, operation_id: &str) -> Option<CancellationToken> {
        self.operations.get(operation_id).map(|entry| entry.cancel.clone())
    }

    /// Signal cancellation; returns `false` for unknown or finished operations
    pub fn cancel(&self, operation_id: &str) -> bool {
        match self.operations.get(operation_id) {
            Some(entry) if !entry.progress.status.is_terminal() => {
                entry.cancel.cancel();
                info!("Cancellation requested for operation {}", operation_id);
                true
            }
            _ => false,
        }
    }

    /// Drop finished operations that fall outside the retention policy
    pub fn evict_expired(&self) -> usize {
        self.evict_at(Utc::now())
    }

    pub(crate) fn evict_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.operations.len();
        let cutoff = now - self.retention.ttl;

        self.operations.retain(|_, entry| match entry.progress.end_time {
            Some(end) if entry.progress.status.is_terminal() => end > cutoff,
            _ => true,
        });

        let mut finished: Vec<(DateTime<Utc>, String)> = self
            .operations
            .iter()
            .filter(|entry| entry.progress.status.is_terminal())
            .filter_map(|entry| entry.progress.end_time.map(|end| (end, entry.key().clone())))
            .collect();

        if finished.len() > self.retention.max_retained {
            finished.sort();
            let excess = finished.len() - self.retention.max_retained;
            for (_, operation_id) in finished.into_iter().take(excess) {
                self.operations.remove(&operation_id);
            }
        }

        self.active_keys
            .retain(|_, operation_id| self.operations.contains_key(operation_id.as_str()));

        let evicted = before.saturating_sub(self.operations.len());
        if evicted > 0 {
            debug!("Evicted {} finished operations", evicted);
        }
        evicted
    }

    /// Apply a terminal transition and release the digest mapping
    fn finish<F>(&self, operation_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut OperationProgress),
    {
        let digest = {
            let Some(mut entry) = self.operations.get_mut(operation_id) else {
                warn!("Terminal report for unknown operation {}", operation_id);
                return false;
            };
            if entry.progress.status.is_terminal() {
                debug!("Operation {} already finished; ignoring terminal report", operation_id);
                return false;
            }

            apply(&mut entry.progress);
            entry.progress.end_time = Some(Utc::now());
            entry.progress.estimated_seconds_remaining = None;
            entry.digest.clone()
        };

        self.active_keys
            .remove_if(&digest, |_, mapped| mapped.as_str() == operation_id);
        true
    }
}

impl ProgressQuery for OperationRegistry {
    fn get(&self, operation_id: &str) -> Option<OperationProgress> {
        self.operations.get(operation_id).map(|entry| entry.progress.clone())
    }
}

impl ProgressReporter for OperationRegistry {
    fn report_progress(&self, update: ProgressUpdate) -> bool {
        let Some(mut entry) = self.operations.get_mut(&update.operation_id) else {
            warn!("Progress for unknown operation {}", update.operation_id);
            return false;
        };

        let progress = &mut entry.progress;
        if progress.status.is_terminal() {
            return false;
        }

        progress.status = OperationStatus::Running;
        progress.advance_to(update.current_step, update.total_steps);
        progress.current_operation = update.current_operation;
        progress.metadata.extend(update.metadata);
        progress.refresh_estimate(Utc::now());
        true
    }

    fn report_error(&self, operation_id: &str, message: &str) {
        let applied = self.finish(operation_id, |progress| {
            progress.status = OperationStatus::Failed;
            progress.error_message = Some(message.to_string());
        });

        if applied {
            warn!("Operation {} failed: {}", operation_id, message);
        }
    }

    fn report_completion(&self, operation_id: &str, result: OperationResult) {
        let success = result.success;
        let applied = self.finish(operation_id, |progress| {
            let total = progress.total_steps;
            progress.advance_to(total, total);
            progress.status = if result.success {
                OperationStatus::Completed
            } else {
                OperationStatus::Failed
            };
            if !result.success {
                progress.error_message = Some(result.message.clone());
            }
            progress
                .metadata
                .insert("resultMessage".to_string(), Value::String(result.message));
            progress.output_files = result.output_files;
        });

        if applied {
            info!("Operation {} finished (success: {})", operation_id, success);
        }
    }
}
