use async_trait::async_trait;
use sqlx::{Acquire, PgPool, Postgres, Transaction};

use super::{
    ClaimedBatch, ListParams, NewNotification, NotificationPage, NotificationStore, QueueError,
    ensure_claimed, validate_id, validate_limit,
};
use crate::db;
use crate::models::{Notification, NotificationStatus};

/// Queue store backed by the `notification_queue` table.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn enqueue(&self, new: NewNotification) -> Result<Notification, QueueError> {
        new.validate()?;
        let item =
            db::notifications::insert(&self.pool, new.workspace_id, &new.event_type, &new.payload)
                .await?;
        Ok(item)
    }

    async fn get(&self, id: i64) -> Result<Notification, QueueError> {
        validate_id(id)?;
        db::notifications::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(id))
    }

    async fn list(&self, params: &ListParams) -> Result<NotificationPage, QueueError> {
        let (limit, offset) = params.window()?;

        // One snapshot for both queries so a page and its total agree.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        let total = db::notifications::count(&mut *tx, params.workspace_id, params.status).await?;
        let rows =
            db::notifications::list(&mut *tx, params.workspace_id, params.status, limit, offset)
                .await?;
        tx.commit().await?;

        Ok(NotificationPage::new(rows, offset, limit, total))
    }

    async fn mark_processed(&self, id: i64) -> Result<Notification, QueueError> {
        validate_id(id)?;
        db::notifications::mark_processed(&self.pool, id)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(id))
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<Notification, QueueError> {
        validate_id(id)?;
        db::notifications::mark_failed(&self.pool, id, error)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(id))
    }

    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, QueueError> {
        let limit = validate_limit(limit)?;
        let mut tx = self.pool.begin().await?;
        let mut items = db::notifications::claim(&mut *tx, limit).await?;
        for item in &mut items {
            item.status = NotificationStatus::Processing;
        }
        Ok(Box::new(PgClaimedBatch { tx, items }))
    }
}

/// Row locks live in `tx` until release (commit) or drop (rollback).
struct PgClaimedBatch {
    tx: Transaction<'static, Postgres>,
    items: Vec<Notification>,
}

#[async_trait]
impl ClaimedBatch for PgClaimedBatch {
    fn items(&self) -> &[Notification] {
        &self.items
    }

    async fn mark_processed(&mut self, id: i64) -> Result<Notification, QueueError> {
        ensure_claimed(&self.items, id)?;
        // Savepoint per mark: a failed statement must not abort the whole claim.
        let mut savepoint = (&mut *self.tx).begin().await?;
        let item = db::notifications::mark_processed(&mut *savepoint, id)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(id))?;
        savepoint.commit().await?;
        Ok(item)
    }

    async fn mark_failed(&mut self, id: i64, error: &str) -> Result<Notification, QueueError> {
        ensure_claimed(&self.items, id)?;
        let mut savepoint = (&mut *self.tx).begin().await?;
        let item = db::notifications::mark_failed(&mut *savepoint, id, error)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(id))?;
        savepoint.commit().await?;
        Ok(item)
    }

    async fn release(self: Box<Self>) -> Result<(), QueueError> {
        self.tx.commit().await?;
        Ok(())
    }
}
