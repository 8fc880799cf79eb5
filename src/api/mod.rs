pub mod models;
pub mod status;
pub mod webhooks;

use std::sync::Arc;

use crate::queue::TaskQueue;
use crate::reconciliation::store::ReconciliationStore;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReconciliationStore>,
    pub queue: Arc<dyn TaskQueue>,
}
