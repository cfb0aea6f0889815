pub mod import;
pub mod notifications;

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Notifications
        .route(
            "/api/v1/workspaces/{workspace_id}/notifications",
            get(notifications::list),
        )
        .route(
            "/api/v1/notifications/{id}/processed",
            post(notifications::acknowledge),
        )
        // Import
        .route(
            "/api/v1/workspaces/{workspace_id}/projects/{project_id}/tasks/import",
            post(import::import_tasks),
        )
}
