use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }

    /// Empty means "use the default"; anything else must be a known priority.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim() {
            "" | "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(format!("invalid priority '{other}'")),
        }
    }
}

/// One entry of a bulk import request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default, alias = "assignedTo")]
    pub assigned_to: String,
    #[serde(default, alias = "dueDate")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Validated parameters for a task insert.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub workspace_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl NewTask {
    pub fn from_input(workspace_id: Uuid, project_id: Uuid, input: TaskInput) -> Result<Self, String> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err("title is required".to_string());
        }
        let priority = TaskPriority::parse(&input.priority)?;
        let assigned_to = Some(input.assigned_to.trim().to_string()).filter(|s| !s.is_empty());

        Ok(NewTask {
            workspace_id,
            project_id,
            title,
            description: input.description,
            priority,
            assigned_to,
            due_date: input.due_date,
            metadata: input.metadata.unwrap_or_else(|| serde_json::json!({})),
        })
    }
}
