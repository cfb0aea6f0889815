use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Notification, NotificationStatus};
use crate::queue::{ListParams, NotificationPage};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page_size: Option<i64>,
    pub page_token: Option<String>,
}

pub async fn list(
    State(state): State<SharedState>,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationPage>, AppError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<NotificationStatus>().map_err(AppError::BadRequest)?),
    };

    let params = ListParams {
        workspace_id,
        status,
        page_size: query.page_size,
        page_token: query.page_token,
    };

    let page = state.notifications.list(&params).await?;
    Ok(Json(page))
}

pub async fn acknowledge(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, AppError> {
    let notification = state.notifications.mark_processed(id).await?;
    Ok(Json(notification))
}
