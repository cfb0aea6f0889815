//! Task creation, the one piece of task storage the import pipeline needs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{NewTask, Task};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("create task: {0}")]
    Storage(#[from] sqlx::Error),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task, TaskError>;
}

#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task, TaskError> {
        Ok(db::tasks::create(&self.pool, &task).await?)
    }
}

#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: NewTask) -> Result<Task, TaskError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            workspace_id: task.workspace_id,
            project_id: task.project_id,
            title: task.title,
            description: task.description,
            status: "todo".to_string(),
            priority: task.priority.as_str().to_string(),
            assigned_to: task.assigned_to,
            due_date: task.due_date,
            metadata: task.metadata,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.clone());
        Ok(task)
    }
}
