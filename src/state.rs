use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::import::ImportEngine;
use crate::queue::NotificationStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub notifications: Arc<dyn NotificationStore>,
    pub importer: ImportEngine,
    /// Fired on shutdown; in-flight imports stop scheduling new items.
    pub shutdown: CancellationToken,
}
