#![allow(dead_code)]

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use tasknotify::config::{Config, ImportConfig, WorkerConfig};
use tasknotify::models::{NewTask, Notification, Task};
use tasknotify::queue::{
    ClaimedBatch, ListParams, MemoryNotificationStore, NewNotification, NotificationPage,
    NotificationStore, QueueError,
};
use tasknotify::tasks::{MemoryTaskStore, TaskError, TaskStore};
use tasknotify::transport::{Transport, TransportError};

// ── Test doubles ────────────────────────────────────────────────

/// Records every delivery attempt; fails items whose payload has `"fail": true`.
#[derive(Default)]
pub struct RecordingTransport {
    pub attempted: Mutex<Vec<i64>>,
}

impl RecordingTransport {
    pub fn attempted(&self) -> Vec<i64> {
        self.attempted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        self.attempted.lock().unwrap().push(notification.id);
        if notification.payload["fail"] == json!(true) {
            return Err(TransportError::new("simulated delivery failure"));
        }
        Ok(())
    }
}

/// Sleeps before every delivery, then succeeds or fails as configured.
pub struct SlowTransport {
    pub delay: Duration,
    pub fail: bool,
}

#[async_trait]
impl Transport for SlowTransport {
    fn name(&self) -> &str {
        "slow"
    }

    async fn send(&self, _notification: &Notification) -> Result<(), TransportError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(TransportError::new("slow delivery failed"));
        }
        Ok(())
    }
}

fn storage_down() -> QueueError {
    QueueError::Storage(sqlx::Error::PoolTimedOut)
}

/// A queue store whose storage is always unavailable.
pub struct UnavailableStore;

#[async_trait]
impl NotificationStore for UnavailableStore {
    async fn enqueue(&self, _new: NewNotification) -> Result<Notification, QueueError> {
        Err(storage_down())
    }

    async fn get(&self, _id: i64) -> Result<Notification, QueueError> {
        Err(storage_down())
    }

    async fn list(&self, _params: &ListParams) -> Result<NotificationPage, QueueError> {
        Err(storage_down())
    }

    async fn mark_processed(&self, _id: i64) -> Result<Notification, QueueError> {
        Err(storage_down())
    }

    async fn mark_failed(&self, _id: i64, _error: &str) -> Result<Notification, QueueError> {
        Err(storage_down())
    }

    async fn claim_batch(&self, _limit: usize) -> Result<Box<dyn ClaimedBatch>, QueueError> {
        Err(storage_down())
    }
}

/// Wraps the in-memory store; claimed batches fail `mark_processed` for one id.
pub struct FlakyAckStore {
    pub inner: MemoryNotificationStore,
    pub fail_ack_for: i64,
}

#[async_trait]
impl NotificationStore for FlakyAckStore {
    async fn enqueue(&self, new: NewNotification) -> Result<Notification, QueueError> {
        self.inner.enqueue(new).await
    }

    async fn get(&self, id: i64) -> Result<Notification, QueueError> {
        self.inner.get(id).await
    }

    async fn list(&self, params: &ListParams) -> Result<NotificationPage, QueueError> {
        self.inner.list(params).await
    }

    async fn mark_processed(&self, id: i64) -> Result<Notification, QueueError> {
        self.inner.mark_processed(id).await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<Notification, QueueError> {
        self.inner.mark_failed(id, error).await
    }

    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, QueueError> {
        let inner = self.inner.claim_batch(limit).await?;
        Ok(Box::new(FlakyAckBatch {
            inner,
            fail_ack_for: self.fail_ack_for,
        }))
    }
}

struct FlakyAckBatch {
    inner: Box<dyn ClaimedBatch>,
    fail_ack_for: i64,
}

#[async_trait]
impl ClaimedBatch for FlakyAckBatch {
    fn items(&self) -> &[Notification] {
        self.inner.items()
    }

    async fn mark_processed(&mut self, id: i64) -> Result<Notification, QueueError> {
        if id == self.fail_ack_for {
            return Err(storage_down());
        }
        self.inner.mark_processed(id).await
    }

    async fn mark_failed(&mut self, id: i64, error: &str) -> Result<Notification, QueueError> {
        self.inner.mark_failed(id, error).await
    }

    async fn release(self: Box<Self>) -> Result<(), QueueError> {
        self.inner.release().await
    }
}

/// Task store that fails titles starting with "fail", optionally delays each
/// call, and tracks the peak number of concurrent calls.
#[derive(Default)]
pub struct InstrumentedTaskStore {
    pub inner: MemoryTaskStore,
    pub delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl InstrumentedTaskStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for InstrumentedTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if task.title.starts_with("fail") {
            Err(TaskError::Storage(sqlx::Error::RowNotFound))
        } else {
            self.inner.create(task).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ── Postgres-backed fixtures ────────────────────────────────────

/// A dedicated, migrated database. `None` when `DATABASE_URL` is not set.
pub struct TestDb {
    pub pool: PgPool,
    pub url: String,
    pub db_name: String,
}

fn database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            None
        }
    }
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

pub async fn test_db() -> Option<TestDb> {
    let base_url = database_url()?;

    let db_name = format!("tasknotify_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    Some(TestDb { pool, url, db_name })
}

/// Drop the test database.
pub async fn cleanup_db(db: TestDb) {
    db.pool.close().await;

    let Some(base_url) = database_url() else {
        return;
    };
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", db.db_name))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}

pub fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        log_level: "warn".to_string(),
        db_max_connections: 5,
        worker: WorkerConfig {
            worker_count: 1,
            batch_size: 10,
            poll_interval: Duration::from_millis(50),
            send_latency: Duration::ZERO,
            send_timeout: Duration::from_secs(5),
        },
        import: ImportConfig {
            concurrency: 4,
            rate_per_second: NonZeroU32::new(1000).unwrap(),
            burst: NonZeroU32::new(100).unwrap(),
        },
    }
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub db: TestDb,
    pub client: Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

pub async fn spawn_app() -> Option<TestApp> {
    let db = test_db().await?;
    let (app, _state) = tasknotify::build_app(db.pool.clone(), test_config(db.url.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    Some(TestApp {
        addr,
        db,
        client: Client::new(),
    })
}

pub async fn cleanup(app: TestApp) {
    cleanup_db(app.db).await;
}
