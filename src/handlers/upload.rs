use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension, Path},
    response::Redirect,
    routing::post,
    Router,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;

use super::pages::{combine_path, plan_path, redirect_error, step_path, workflow_redirect};
use crate::starting_image::ImageSource;
use crate::types::{CreateSession, UploadOutcome};
use crate::AppState;

pub fn upload_routes(max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/create", post(create_session))
        .route("/upload/:session_id/:step", post(upload_step_video))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Multipart scene form: `openai_api_key`, `scene_description`, `num_clips`,
/// `starting_image_file` or `starting_image_url`
pub async fn create_session(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Redirect {
    let mut request = CreateSession::default();
    let mut image_file: Option<ImageSource> = None;
    let mut image_url: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Malformed scene form: {}", e);
                return redirect_error("/", &format!("Could not read form: {}", e));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "starting_image_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => return redirect_error("/", &format!("Could not read image: {}", e)),
                };
                if !filename.is_empty() && !bytes.is_empty() {
                    image_file = Some(ImageSource::Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "openai_api_key" | "scene_description" | "num_clips" | "starting_image_url" => {
                let value = match field.text().await {
                    Ok(value) => value.trim().to_string(),
                    Err(e) => return redirect_error("/", &format!("Could not read form: {}", e)),
                };
                match name.as_str() {
                    "openai_api_key" => request.api_key = Some(value),
                    "scene_description" => request.scene_description = value,
                    "num_clips" if !value.is_empty() => match value.parse::<usize>() {
                        Ok(n) => request.num_clips = Some(n),
                        Err(_) => return redirect_error("/", "Number of clips must be a whole number"),
                    },
                    "starting_image_url" if !value.is_empty() => image_url = Some(value),
                    _ => {}
                }
            }
            other => tracing::debug!("Ignoring form field '{}'", other),
        }
    }

    // An uploaded file wins over a URL
    request.image = image_file.or(image_url.map(ImageSource::Url));

    match state.workflow.create_session(request).await {
        Ok(session_id) => Redirect::to(&plan_path(&session_id)),
        Err(e) => {
            tracing::warn!("Session creation failed: {}", e);
            redirect_error("/", &format!("Error creating session: {}", e))
        }
    }
}

/// Multipart `video` upload for one step; streams the body to disk
pub async fn upload_step_video(
    Extension(state): Extension<Arc<AppState>>,
    Path((session_id, step)): Path<(String, usize)>,
    mut multipart: Multipart,
) -> Redirect {
    let back = step_path(&session_id, step);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return redirect_error(&back, &format!("Could not read upload: {}", e)),
        };
        if field.name() != Some("video") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return redirect_error(&back, "No video file selected");
        }

        let body = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(body));

        return match state
            .workflow
            .ingest_step_video(&session_id, step, &filename, reader)
            .await
        {
            Ok(UploadOutcome::NextStep(next)) => Redirect::to(&step_path(&session_id, next)),
            Ok(UploadOutcome::ReadyToCombine) => Redirect::to(&combine_path(&session_id)),
            Err(e) => workflow_redirect(&e, &session_id, &back),
        };
    }

    redirect_error(&back, "No video file provided")
}
