//! Bulk task import.
//!
//! Inputs are attempted independently under two limits: a per-call semaphore
//! caps how many creations are in flight, and the engine-wide token bucket caps
//! how fast they start. One item failing never cancels its siblings, and the
//! call returns only after every input has an outcome.

use std::num::NonZeroU32;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{ImportResult, NewTask, TaskInput};
use crate::queue::{NewNotification, NotificationStore};
use crate::rate_limit::ImportRateLimiter;
use crate::tasks::TaskStore;

pub const IMPORTED_EVENT: &str = "task.imported";
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub concurrency: usize,
    pub rate_per_second: NonZeroU32,
    pub burst: NonZeroU32,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_per_second: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
            burst: NonZeroU32::new(DEFAULT_CONCURRENCY as u32).unwrap_or(NonZeroU32::MIN),
        }
    }
}

#[derive(Clone)]
pub struct ImportEngine {
    tasks: Arc<dyn TaskStore>,
    notifications: Arc<dyn NotificationStore>,
    limiter: Arc<ImportRateLimiter>,
    concurrency: usize,
}

impl ImportEngine {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        notifications: Arc<dyn NotificationStore>,
        settings: ImportSettings,
    ) -> Self {
        let concurrency = if settings.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            settings.concurrency
        };
        Self {
            tasks,
            notifications,
            limiter: Arc::new(ImportRateLimiter::new(
                settings.rate_per_second,
                settings.burst,
            )),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Create a task per input. Cancelling `cancel` fails pending rate-limit
    /// waits and every input not yet started; creations already in flight run
    /// to completion.
    pub async fn import(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
        inputs: Vec<TaskInput>,
        cancel: &CancellationToken,
    ) -> ImportResult {
        let mut result = ImportResult {
            total: inputs.len(),
            ..ImportResult::empty()
        };
        if inputs.is_empty() {
            return result;
        }

        tracing::info!(
            %workspace_id,
            %project_id,
            total = result.total,
            concurrency = self.concurrency,
            "Starting bulk import"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();
        let mut settled = vec![false; result.total];

        for (index, input) in inputs.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                result.record_failure(index, "import cancelled");
                settled[index] = true;
                continue;
            };

            let item = ImportItem {
                engine: self.clone(),
                cancel: cancel.clone(),
                workspace_id,
                project_id,
            };
            running.spawn(async move {
                let outcome = item.run(input).await;
                drop(permit);
                (index, outcome)
            });

            // Collect whatever already finished so the set stays small.
            while let Some(joined) = running.try_join_next() {
                settle(joined, &mut result, &mut settled);
            }
        }

        while let Some(joined) = running.join_next().await {
            settle(joined, &mut result, &mut settled);
        }

        // A panicked item loses its index in the join error; account for it here.
        for (index, done) in settled.iter().enumerate() {
            if !done {
                result.record_failure(index, "import task aborted");
            }
        }

        result.errors.sort_by_key(|e| e.index);

        tracing::info!(
            %workspace_id,
            %project_id,
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Bulk import completed"
        );

        result
    }
}

fn settle(
    joined: Result<(usize, Result<(), String>), tokio::task::JoinError>,
    result: &mut ImportResult,
    settled: &mut [bool],
) {
    match joined {
        Ok((index, Ok(()))) => {
            result.record_success();
            settled[index] = true;
        }
        Ok((index, Err(error))) => {
            tracing::warn!(index, %error, "Import item failed");
            result.record_failure(index, error);
            settled[index] = true;
        }
        Err(e) => {
            tracing::error!("Import item task failed: {e}");
        }
    }
}

struct ImportItem {
    engine: ImportEngine,
    cancel: CancellationToken,
    workspace_id: Uuid,
    project_id: Uuid,
}

impl ImportItem {
    async fn run(self, input: TaskInput) -> Result<(), String> {
        let new_task = NewTask::from_input(self.workspace_id, self.project_id, input)?;

        self.engine
            .limiter
            .acquire(&self.cancel)
            .await
            .map_err(|e| format!("rate limit: {e}"))?;

        let task = self
            .engine
            .tasks
            .create(new_task)
            .await
            .map_err(|e| e.to_string())?;

        // Best effort: the import already succeeded.
        let notification = NewNotification::new(
            self.workspace_id,
            IMPORTED_EVENT,
            json!({ "task_id": task.id, "title": task.title }),
        );
        if let Err(e) = self.engine.notifications.enqueue(notification).await {
            tracing::warn!(task_id = %task.id, "Failed to enqueue import notification: {e}");
        }

        Ok(())
    }
}
