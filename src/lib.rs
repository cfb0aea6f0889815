pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod queue;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod transport;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::import::ImportEngine;
use crate::queue::{NotificationStore, PgNotificationStore};
use crate::state::{AppState, SharedState};
use crate::tasks::PgTaskStore;

/// Large enough for a maximal import request.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn build_app(pool: PgPool, config: Config) -> (Router, SharedState) {
    let notifications: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(pool.clone()));
    let importer = ImportEngine::new(
        Arc::new(PgTaskStore::new(pool)),
        notifications.clone(),
        config.import.settings(),
    );

    let state: SharedState = Arc::new(AppState {
        notifications,
        importer,
        shutdown: CancellationToken::new(),
    });

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
