use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ClaimedBatch, ListParams, NewNotification, NotificationPage, NotificationStore, QueueError,
    backoff, ensure_claimed, validate_id, validate_limit,
};
use crate::models::{Notification, NotificationStatus};

const DEFAULT_MAX_RETRIES: i32 = 5;

/// Process-local queue store with the same claim semantics as Postgres.
///
/// Claimed ids are held in a lock set until the batch is released or dropped.
/// Outcome marks apply immediately; there is no rollback on drop.
#[derive(Clone, Default)]
pub struct MemoryNotificationStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    last_id: i64,
    rows: BTreeMap<i64, Notification>,
    locked: HashSet<i64>,
    clock_offset: chrono::Duration,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
            locked: HashSet::new(),
            clock_offset: chrono::Duration::zero(),
        }
    }
}

impl Inner {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    fn mark_processed(&mut self, id: i64) -> Result<Notification, QueueError> {
        let now = self.now();
        let row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| QueueError::notification_not_found(id))?;
        row.status = NotificationStatus::Processed;
        row.processed_at.get_or_insert(now);
        Ok(row.clone())
    }

    fn mark_failed(&mut self, id: i64, error: &str) -> Result<Notification, QueueError> {
        let now = self.now();
        let row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| QueueError::notification_not_found(id))?;
        row.status = NotificationStatus::Failed;
        row.last_error = error.to_string();
        row.retry_count = row.retry_count.saturating_add(1);
        row.next_retry_at = Some(backoff::next_retry_at(now, row.retry_count));
        Ok(row.clone())
    }
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift this store's clock forward, making scheduled retries come due.
    pub fn advance(&self, by: chrono::Duration) {
        let mut inner = self.lock();
        inner.clock_offset += by;
    }

    /// The store's current notion of "now".
    pub fn now(&self) -> DateTime<Utc> {
        self.lock().now()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().rows.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning leaves the rows intact.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn enqueue(&self, new: NewNotification) -> Result<Notification, QueueError> {
        new.validate()?;
        let mut inner = self.lock();
        inner.last_id += 1;
        let item = Notification {
            id: inner.last_id,
            workspace_id: new.workspace_id,
            event_type: new.event_type,
            payload: new.payload,
            status: NotificationStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            last_error: String::new(),
            created_at: inner.now(),
            processed_at: None,
        };
        inner.rows.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: i64) -> Result<Notification, QueueError> {
        validate_id(id)?;
        self.lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| QueueError::notification_not_found(id))
    }

    async fn list(&self, params: &ListParams) -> Result<NotificationPage, QueueError> {
        let (limit, offset) = params.window()?;
        let inner = self.lock();
        let matching: Vec<&Notification> = inner
            .rows
            .values()
            .rev()
            .filter(|n| n.workspace_id == params.workspace_id)
            .filter(|n| params.status.is_none_or(|s| n.status == s))
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(NotificationPage::new(page, offset, limit, total))
    }

    async fn mark_processed(&self, id: i64) -> Result<Notification, QueueError> {
        validate_id(id)?;
        self.lock().mark_processed(id)
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<Notification, QueueError> {
        validate_id(id)?;
        self.lock().mark_failed(id, error)
    }

    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, QueueError> {
        validate_limit(limit)?;
        let mut inner = self.lock();
        let now = inner.now();

        // Ids are assigned in creation order, so key order is FIFO order.
        let ids: Vec<i64> = inner
            .rows
            .values()
            .filter(|n| !inner.locked.contains(&n.id) && n.is_claimable(now))
            .take(limit)
            .map(|n| n.id)
            .collect();

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            inner.locked.insert(id);
            if let Some(row) = inner.rows.get(&id) {
                let mut item = row.clone();
                item.status = NotificationStatus::Processing;
                items.push(item);
            }
        }

        Ok(Box::new(MemoryClaimedBatch {
            store: self.clone(),
            items,
        }))
    }
}

struct MemoryClaimedBatch {
    store: MemoryNotificationStore,
    items: Vec<Notification>,
}

#[async_trait]
impl ClaimedBatch for MemoryClaimedBatch {
    fn items(&self) -> &[Notification] {
        &self.items
    }

    async fn mark_processed(&mut self, id: i64) -> Result<Notification, QueueError> {
        ensure_claimed(&self.items, id)?;
        self.store.lock().mark_processed(id)
    }

    async fn mark_failed(&mut self, id: i64, error: &str) -> Result<Notification, QueueError> {
        ensure_claimed(&self.items, id)?;
        self.store.lock().mark_failed(id, error)
    }

    async fn release(self: Box<Self>) -> Result<(), QueueError> {
        // Locks are returned in Drop.
        Ok(())
    }
}

impl Drop for MemoryClaimedBatch {
    fn drop(&mut self) {
        let mut inner = self.store.lock();
        for item in &self.items {
            inner.locked.remove(&item.id);
        }
    }
}
