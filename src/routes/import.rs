use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ImportResult, TaskInput};
use crate::state::SharedState;

const MAX_IMPORT_TASKS: usize = 10_000;

#[derive(Deserialize)]
pub struct ImportRequest {
    pub tasks: Vec<TaskInput>,
}

pub async fn import_tasks(
    State(state): State<SharedState>,
    Path((workspace_id, project_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResult>, AppError> {
    if req.tasks.len() > MAX_IMPORT_TASKS {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_IMPORT_TASKS} tasks per import"
        )));
    }

    // Cancelled on shutdown, or when the client goes away and this future is dropped.
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let result = state
        .importer
        .import(workspace_id, project_id, req.tasks, &cancel)
        .await;
    Ok(Json(result))
}
