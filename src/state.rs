use std::sync::Arc;

use crate::orchestrator::Orchestrator;

// app's shared state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}
