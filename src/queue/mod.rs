//! Durable notification queue: storage contract, claiming and retry scheduling.
//!
//! A [`NotificationStore`] owns every row. Workers never write fields directly;
//! they claim a [`ClaimedBatch`] and report outcomes through it. While a batch
//! is held its rows are invisible to other claimers (skip-locked semantics).
//! Nothing about the claim is persisted: dropping a batch without
//! [`ClaimedBatch::release`] simply makes its rows claimable again.

pub mod backoff;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Notification, NotificationStatus};

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl QueueError {
    pub(crate) fn notification_not_found(id: i64) -> Self {
        QueueError::NotFound(format!("notification {id} not found"))
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub workspace_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewNotification {
    pub fn new(workspace_id: Uuid, event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            workspace_id,
            event_type: event_type.into(),
            payload,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        if self.event_type.trim().is_empty() {
            return Err(QueueError::InvalidInput("event_type is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub workspace_id: Uuid,
    pub status: Option<NotificationStatus>,
    pub page_size: Option<i64>,
    /// Decimal offset returned as `next_page_token` by the previous page.
    pub page_token: Option<String>,
}

impl ListParams {
    /// Resolve `(limit, offset)`. Out-of-range sizes fall back to the default.
    pub fn window(&self) -> Result<(i64, i64), QueueError> {
        let limit = match self.page_size {
            Some(size) if size > 0 && size <= MAX_PAGE_SIZE => size,
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = match self.page_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token
                .parse::<i64>()
                .ok()
                .filter(|o| *o >= 0)
                .ok_or_else(|| QueueError::InvalidInput(format!("invalid page token '{token}'")))?,
        };
        Ok((limit, offset))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub total_count: i64,
}

impl NotificationPage {
    pub(crate) fn new(notifications: Vec<Notification>, offset: i64, limit: i64, total_count: i64) -> Self {
        let next = offset + limit;
        Self {
            notifications,
            next_page_token: (next < total_count).then(|| next.to_string()),
            total_count,
        }
    }
}

/// The single owner of queue rows. Safe for any number of concurrent callers.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a `pending` row that is immediately eligible.
    async fn enqueue(&self, new: NewNotification) -> Result<Notification, QueueError>;

    async fn get(&self, id: i64) -> Result<Notification, QueueError>;

    async fn list(&self, params: &ListParams) -> Result<NotificationPage, QueueError>;

    /// Mark a row processed outside of any claim (acknowledge). Idempotent.
    async fn mark_processed(&self, id: i64) -> Result<Notification, QueueError>;

    /// Record a failure outside of any claim and schedule the retry.
    async fn mark_failed(&self, id: i64, error: &str) -> Result<Notification, QueueError>;

    /// Exclusively claim up to `limit` eligible rows, oldest first.
    ///
    /// Concurrent callers always receive disjoint sets. Rows held by another
    /// claim are skipped rather than waited on.
    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, QueueError>;
}

/// Rows held exclusively by one worker for one claim-and-handle cycle.
#[async_trait]
pub trait ClaimedBatch: Send {
    /// Claimed rows in creation order, reported with status `processing`.
    fn items(&self) -> &[Notification];

    async fn mark_processed(&mut self, id: i64) -> Result<Notification, QueueError>;

    async fn mark_failed(&mut self, id: i64, error: &str) -> Result<Notification, QueueError>;

    /// Persist recorded outcomes and give up the claim.
    async fn release(self: Box<Self>) -> Result<(), QueueError>;
}

pub(crate) fn validate_id(id: i64) -> Result<(), QueueError> {
    if id <= 0 {
        return Err(QueueError::InvalidInput(format!("invalid notification id {id}")));
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: usize) -> Result<i64, QueueError> {
    if limit == 0 {
        return Err(QueueError::InvalidInput("claim limit must be positive".to_string()));
    }
    i64::try_from(limit).map_err(|_| QueueError::InvalidInput(format!("claim limit {limit} out of range")))
}

pub(crate) fn ensure_claimed(items: &[Notification], id: i64) -> Result<(), QueueError> {
    if items.iter().any(|n| n.id == id) {
        Ok(())
    } else {
        Err(QueueError::InvalidInput(format!(
            "notification {id} is not part of this claim"
        )))
    }
}
