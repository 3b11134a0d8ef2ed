// lib.rs - ClipChain: guided assembly of a multi-clip video story
pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openai_client;
pub mod planner;
pub mod starting_image;
pub mod types;
pub mod utils;
pub mod workflow;

use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use config::Config;
use openai_client::OpenAiClient;
use planner::ClipPlanner;
use utils::FfmpegRunner;
use workflow::checkpoint::{FileSessionStore, StoreError};
use workflow::StoryWorkflow;

pub struct AppState {
    pub config: Config,
    pub workflow: StoryWorkflow,
    /// Version line reported by the media tool at startup
    pub media_tool: String,
}

/// Wire the production collaborators: file-backed store, OpenAI planner and ffmpeg.
pub async fn build_workflow(config: &Config) -> Result<StoryWorkflow, StoreError> {
    let store = FileSessionStore::new(&config.sessions_dir).await?;

    let completion = OpenAiClient::new(config.openai_base_url.clone(), config.planner_model.clone())
        .with_temperature(config.planner_temperature)
        .with_timeout(config.planner_timeout)
        .with_retry_budget(config.planner_retry_budget);

    Ok(StoryWorkflow::new(
        Arc::new(store),
        ClipPlanner::new(Arc::new(completion)),
        Arc::new(FfmpegRunner::new(config.ffmpeg_path.clone())),
        config.upload_dir.clone(),
    )
    .with_default_api_key(config.default_api_key.clone())
    .with_clip_limits(config.default_clips, config.max_clips))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::ui::ui_routes())
        .merge(handlers::upload::upload_routes(state.config.max_upload_bytes))
        .merge(handlers::output::output_routes())
        .merge(handlers::api::api_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
