// error.rs - Workflow and startup error types
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::starting_image::ImageError;
use crate::utils::MediaError;
use crate::workflow::checkpoint::StoreError;

/// Startup errors; any of these aborts the server.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("media tool unavailable: {0}")]
    MediaTool(#[from] MediaError),
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid step number {step} (session has {num_clips} clips)")]
    InvalidStep { step: usize, num_clips: usize },
    #[error("Previous step not completed (next step is {expected})")]
    StepNotReady { step: usize, expected: usize },
    #[error("Step {0} has already been uploaded")]
    AlreadyUploaded(usize),
    #[error("Not all videos have been uploaded (missing steps {missing:?})")]
    Incomplete { missing: Vec<usize> },
    #[error("File not found: {}", .0.display())]
    FileMissing(PathBuf),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            WorkflowError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WorkflowError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            WorkflowError::InvalidStep { .. } => (StatusCode::BAD_REQUEST, "invalid_step"),
            WorkflowError::StepNotReady { .. } => (StatusCode::CONFLICT, "step_not_ready"),
            WorkflowError::AlreadyUploaded(_) => (StatusCode::CONFLICT, "already_uploaded"),
            WorkflowError::Incomplete { .. } => (StatusCode::CONFLICT, "session_incomplete"),
            WorkflowError::FileMissing(_) => (StatusCode::NOT_FOUND, "file_missing"),
            WorkflowError::Media(_) => (StatusCode::UNPROCESSABLE_ENTITY, "media_error"),
            WorkflowError::Image(_) => (StatusCode::BAD_REQUEST, "image_error"),
            WorkflowError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            WorkflowError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "workflow error");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
