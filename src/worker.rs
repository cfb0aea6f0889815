use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::queue::{ClaimedBatch, NotificationStore};
use crate::transport::Transport;

/// Per-item delivery bound. A Postgres claim holds its row locks until the
/// whole batch is done, so this times `batch_size` bounds how long a claimed
/// row stays locked.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Counts for one `run_batch` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub processed: usize,
    pub failed: usize,
    /// Items whose outcome could not be recorded at all. They keep their
    /// previous state and stay eligible.
    pub unrecorded: usize,
    /// The claim itself failed; nothing was attempted this cycle.
    pub claim_failed: bool,
}

/// Claims batches from the queue and hands each item to the transport.
#[derive(Clone)]
pub struct NotificationWorker {
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
}

impl NotificationWorker {
    pub fn new(store: Arc<dyn NotificationStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Claim up to `batch_size` rows and deliver them one after another.
    ///
    /// A failed delivery marks that item failed and moves on. A claim error is
    /// logged and treated as an empty cycle.
    pub async fn run_batch(&self, batch_size: usize) -> BatchReport {
        let mut report = BatchReport::default();

        let mut batch = match self.store.claim_batch(batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Failed to claim notification batch: {e}");
                report.claim_failed = true;
                return report;
            }
        };

        let items = batch.items().to_vec();
        report.claimed = items.len();
        if items.is_empty() {
            tracing::debug!("No pending notifications");
            return report;
        }

        tracing::info!(count = items.len(), "Processing notification batch");

        for item in &items {
            tracing::debug!(
                "Delivering notification {} (event={}, workspace={}, retry={})",
                item.id,
                item.event_type,
                item.workspace_id,
                item.retry_count
            );

            let sent = match tokio::time::timeout(self.send_timeout, self.transport.send(item)).await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.message),
                Err(_) => Err(format!(
                    "{} transport timed out after {}ms",
                    self.transport.name(),
                    self.send_timeout.as_millis()
                )),
            };

            match sent {
                Ok(()) => match batch.mark_processed(item.id).await {
                    Ok(_) => report.processed += 1,
                    Err(e) => {
                        tracing::error!("Failed to mark notification {} processed: {e}", item.id);
                        record_failure(&mut *batch, item.id, &e.to_string(), &mut report).await;
                    }
                },
                Err(error) => {
                    tracing::warn!("Notification {} delivery failed: {error}", item.id);
                    record_failure(&mut *batch, item.id, &error, &mut report).await;
                }
            }
        }

        if let Err(e) = batch.release().await {
            // Outcomes are lost with the claim; the rows become claimable again.
            tracing::error!("Failed to release notification batch: {e}");
        }

        report
    }
}

async fn record_failure(
    batch: &mut dyn ClaimedBatch,
    id: i64,
    error: &str,
    report: &mut BatchReport,
) {
    match batch.mark_failed(id, error).await {
        Ok(_) => report.failed += 1,
        Err(e) => {
            tracing::error!("Failed to mark notification {id} failed: {e}");
            report.unrecorded += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub worker_count: usize,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

/// Start a worker pool on a dedicated Tokio runtime with its own thread pool.
/// This runs on a separate OS thread and blocks until shutdown is signaled.
pub fn run_pool(
    worker: NotificationWorker,
    shutdown: watch::Receiver<bool>,
    settings: PoolSettings,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("worker-pool".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(settings.worker_count)
                .thread_name("notification-worker")
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!("Failed to build worker runtime: {e}");
                    return;
                }
            };

            runtime.block_on(async {
                let mut handles = Vec::with_capacity(settings.worker_count);

                for id in 0..settings.worker_count {
                    handles.push(tokio::spawn(run(
                        id,
                        worker.clone(),
                        shutdown.clone(),
                        settings,
                    )));
                }

                tracing::info!(
                    "Notification worker pool started ({} workers)",
                    settings.worker_count
                );

                for handle in handles {
                    let _ = handle.await;
                }

                tracing::info!("Notification worker pool stopped");
            });
        })
}

/// A single worker loop. A full batch is followed immediately by another
/// claim; a short, empty or failed one waits for the poll interval.
pub async fn run(
    id: usize,
    worker: NotificationWorker,
    mut shutdown: watch::Receiver<bool>,
    settings: PoolSettings,
) {
    tracing::debug!("Worker {id} started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let report = worker.run_batch(settings.batch_size).await;
        if report.claimed >= settings.batch_size {
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Worker {id} stopped");
}
