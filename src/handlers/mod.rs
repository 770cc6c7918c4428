mod generate;
mod health;
mod metrics;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub use generate::generate_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

// Routes served by `serve`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/generate", post(generate_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
