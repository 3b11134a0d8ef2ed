use std::sync::Arc;

use clip_chain::config::Config;
use clip_chain::error::StartupError;
use clip_chain::utils::FfmpegRunner;
use clip_chain::{build_router, build_workflow, AppState};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().map_err(|e| StartupError::Logging(e.to_string()))?;

    let config = Config::from_env().map_err(|e| {
        tracing::error!("❌ {}", e);
        e
    })?;
    log_configuration(&config);

    // Every upload and concatenation needs ffmpeg; refuse to start without it
    let media_tool = FfmpegRunner::new(config.ffmpeg_path.clone())
        .check_available()
        .await
        .map_err(|e| {
            tracing::error!("❌ ffmpeg not usable at {}: {}", config.ffmpeg_path.display(), e);
            e
        })?;
    tracing::info!("Media tool: {}", media_tool);

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tracing::info!("Uploads directory ready at {}", config.upload_dir.display());

    let workflow = build_workflow(&config).await?;
    let bind_addr = config.bind_addr;

    let state = Arc::new(AppState {
        config,
        workflow,
        media_tool,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,clip_chain=trace,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,clip_chain=info,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("🎬 ClipChain starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);
    Ok(())
}

fn log_configuration(config: &Config) {
    tracing::info!(
        "Configuration - Default API key: {}, Planner: {} @ {}, Clips: {} (max {}), Upload limit: {} MB",
        if config.default_api_key.is_some() { "✅" } else { "❌" },
        config.planner_model,
        config.openai_base_url,
        config.default_clips,
        config.max_clips,
        config.max_upload_bytes / (1024 * 1024)
    );
    tracing::info!(
        "Storage - uploads: {}, sessions: {}",
        config.upload_dir.display(),
        config.sessions_dir.display()
    );
}
