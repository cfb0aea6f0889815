use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::models::{NewTask, Task};

const TASK_COLUMNS: &str = "id, workspace_id, project_id, title, description, status, priority,
     assigned_to, due_date, metadata, created_at, updated_at";

pub async fn create<'e, E: PgExecutor<'e>>(executor: E, task: &NewTask) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "INSERT INTO tasks (workspace_id, project_id, title, description, priority,
                            assigned_to, due_date, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.workspace_id)
    .bind(task.project_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority.as_str())
    .bind(task.assigned_to.as_deref())
    .bind(task.due_date)
    .bind(&task.metadata)
    .fetch_one(executor)
    .await
}

pub async fn list_by_project<'e, E: PgExecutor<'e>>(
    executor: E,
    workspace_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE workspace_id = $1 AND project_id = $2 AND deleted_at IS NULL
         ORDER BY created_at ASC"
    ))
    .bind(workspace_id)
    .bind(project_id)
    .fetch_all(executor)
    .await
}
