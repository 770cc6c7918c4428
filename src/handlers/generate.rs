use axum::{Json, extract::State};
use tracing::debug;

use crate::models::{QuestionRequest, QuestionResponse};
use crate::state::AppState;

// Always answers 200: failures come back as an apology in `response`
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(payload): Json<QuestionRequest>,
) -> Json<QuestionResponse> {
    debug!(question_len = payload.question.len(), "question received");
    let response = state.orchestrator.respond(&payload.question).await;
    Json(QuestionResponse { response })
}
