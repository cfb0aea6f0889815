use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::models::{Notification, NotificationStatus};
use crate::queue::backoff::MAX_BACKOFF_EXPONENT;

pub async fn insert<'e, E: PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<Notification, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "INSERT INTO notification_queue (workspace_id, event_type, payload, status)
         VALUES ($1, $2, $3, 'pending') RETURNING *",
    )
    .bind(workspace_id)
    .bind(event_type)
    .bind(payload)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i64,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>("SELECT * FROM notification_queue WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn list<'e, E: PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
    status: Option<NotificationStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notification_queue
         WHERE workspace_id = $1 AND ($2::text IS NULL OR status = $2)
         ORDER BY created_at DESC, id DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(workspace_id)
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

pub async fn count<'e, E: PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
    status: Option<NotificationStatus>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notification_queue
         WHERE workspace_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(workspace_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_one(executor)
    .await
}

/// Lock up to `limit` eligible rows for the lifetime of the caller's transaction.
/// Rows locked by another transaction are skipped, not waited on.
pub async fn claim<'e, E: PgExecutor<'e>>(
    executor: E,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notification_queue
         WHERE status IN ('pending', 'failed')
           AND (next_retry_at IS NULL OR next_retry_at <= now())
         ORDER BY created_at ASC, id ASC
         LIMIT $1
         FOR UPDATE SKIP LOCKED",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Keeps the first `processed_at` when called again on a processed row.
///
/// Outcome marks stamp `clock_timestamp()`: inside a claim's transaction
/// `now()` is the claim time, not the time of the outcome.
pub async fn mark_processed<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i64,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "UPDATE notification_queue
         SET status = 'processed', processed_at = COALESCE(processed_at, clock_timestamp())
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Record a failed attempt and schedule the retry.
///
/// SET expressions read the pre-update `retry_count`, so the exponent
/// `retry_count + 2` is the incremented count plus one.
pub async fn mark_failed<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i64,
    error: &str,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "UPDATE notification_queue
         SET status = 'failed',
             last_error = $2,
             retry_count = retry_count + 1,
             next_retry_at = clock_timestamp() + make_interval(
                 secs => power(2::float8, LEAST(retry_count + 2, $3)::float8)
             )
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(error)
    .bind(MAX_BACKOFF_EXPONENT as i32)
    .fetch_optional(executor)
    .await
}
