use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::pages::{combine_path, redirect_error, redirect_success, workflow_redirect};
use crate::error::WorkflowError;
use crate::workflow::FINAL_OUTPUT_FILE;
use crate::AppState;

pub fn output_routes() -> Router {
    Router::new()
        .route("/combine/:session_id/generate", post(generate_final_video))
        .route("/download/:session_id", get(download_final_video))
        .route("/image/:session_id/:step", get(step_image))
}

/// Run the concatenation and return to the combine page
async fn generate_final_video(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Redirect {
    let combine = combine_path(&session_id);
    match state.workflow.generate_final(&session_id).await {
        Ok(_) => redirect_success(&combine, "Video combination complete!"),
        Err(WorkflowError::FileMissing(path)) => {
            redirect_error(&combine, &format!("Video file not found: {}", path.display()))
        }
        Err(e) => workflow_redirect(&e, &session_id, &combine),
    }
}

/// Stream the final video as an attachment
async fn download_final_video(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let path = match state.workflow.final_output(&session_id).await {
        Ok(path) => path,
        Err(WorkflowError::FileMissing(_)) => {
            return redirect_error(
                &combine_path(&session_id),
                "Final video not found. Please generate it first.",
            )
            .into_response()
        }
        Err(e) => return workflow_redirect(&e, &session_id, &combine_path(&session_id)).into_response(),
    };

    match tokio::fs::File::open(&path).await {
        Ok(file) => {
            let stream = ReaderStream::new(file);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "video/mp4")
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", FINAL_OUTPUT_FILE),
                )
                .body(axum::body::Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            tracing::error!("Failed to open final video for download: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Source image of a step as `image/jpeg`; 404 when it does not exist yet
async fn step_image(
    Extension(state): Extension<Arc<AppState>>,
    Path((session_id, step)): Path<(String, usize)>,
) -> Response {
    let path = match state.workflow.step_image(&session_id, step).await {
        Ok(path) => path,
        Err(WorkflowError::SessionNotFound(_)) => {
            return (StatusCode::NOT_FOUND, "Session not found").into_response()
        }
        Err(e @ (WorkflowError::Storage(_) | WorkflowError::Io(_))) => {
            tracing::error!("Failed to look up image for session {}: {}", session_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(_) => return (StatusCode::NOT_FOUND, "Image not found").into_response(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => {
            tracing::warn!("Image {} unreadable: {}", path.display(), e);
            (StatusCode::NOT_FOUND, "Image not found").into_response()
        }
    }
}
