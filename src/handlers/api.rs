use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::types::{SessionResponse, StatusResponse};
use crate::AppState;

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/sessions/:session_id", get(get_session))
        .route("/api/status", get(api_status))
}

async fn get_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, WorkflowError> {
    let session = state.workflow.session(&session_id).await?;
    Ok(Json(session.into()))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "operational",
        version: env!("CARGO_PKG_VERSION"),
        media_tool: state.media_tool.clone(),
        planner_model: state.config.planner_model.clone(),
        default_api_key: state.config.default_api_key.is_some(),
        max_clips: state.config.max_clips,
    })
}
