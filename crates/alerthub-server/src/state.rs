use alerthub_engine::NotificationEngine;
use alerthub_storage::AlertStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AlertStore>,
    pub engine: Arc<NotificationEngine>,
}
