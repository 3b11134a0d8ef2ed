#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use clip_chain::config::Config;
use clip_chain::core::CONCAT_MANIFEST;
use clip_chain::planner::{ClipPlanner, CompletionClient, PlannerError};
use clip_chain::starting_image::ImageSource;
use clip_chain::types::CreateSession;
use clip_chain::utils::{MediaError, MediaRunner};
use clip_chain::workflow::checkpoint::FileSessionStore;
use clip_chain::workflow::StoryWorkflow;
use clip_chain::AppState;

/// One recorded media tool invocation
#[derive(Debug, Clone)]
pub struct MediaCall {
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub manifest: Option<String>,
}

/// Stands in for ffmpeg: writes a placeholder at the output path (the last
/// argument, resolved against the working directory) and records the call.
#[derive(Default)]
pub struct FakeMediaRunner {
    calls: Mutex<Vec<MediaCall>>,
    fail: bool,
}

impl FakeMediaRunner {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaRunner for FakeMediaRunner {
    async fn run(&self, args: &[String], working_dir: Option<&Path>) -> Result<(), MediaError> {
        let manifest = working_dir.and_then(|dir| std::fs::read_to_string(dir.join(CONCAT_MANIFEST)).ok());
        self.calls.lock().unwrap().push(MediaCall {
            args: args.to_vec(),
            working_dir: working_dir.map(Path::to_path_buf),
            manifest,
        });

        if self.fail {
            return Err(MediaError::Spawn {
                program: "ffmpeg".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
            });
        }

        let output = PathBuf::from(args.last().expect("output argument"));
        let output = match working_dir {
            Some(dir) if output.is_relative() => dir.join(output),
            _ => output,
        };
        std::fs::write(&output, format!("fake output of {:?}", args)).map_err(MediaError::Manifest)?;
        Ok(())
    }
}

/// Completion client that is always unavailable, so plans use the fallback
pub struct UnavailableCompletion;

#[async_trait]
impl CompletionClient for UnavailableCompletion {
    async fn complete(&self, _api_key: &str, _system: &str, _user: &str) -> Result<String, PlannerError> {
        Err(PlannerError::Http("connection refused".to_string()))
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub state: Arc<AppState>,
    pub runner: Arc<FakeMediaRunner>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_runner(FakeMediaRunner::default(), None).await
    }

    pub async fn with_runner(runner: FakeMediaRunner, default_api_key: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        let upload_dir = dir.path().join("uploads");
        let sessions_dir = dir.path().join("sessions");

        let vars = vec![
            ("UPLOAD_DIR".to_string(), upload_dir.display().to_string()),
            ("SESSIONS_DIR".to_string(), sessions_dir.display().to_string()),
            ("MAX_CLIPS".to_string(), "6".to_string()),
            ("DEFAULT_CLIPS".to_string(), "3".to_string()),
        ];
        let config = Config::from_lookup(|key| {
            if key == "OPENAI_API_KEY" {
                return default_api_key.map(str::to_string);
            }
            vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap();

        let runner = Arc::new(runner);
        let store = FileSessionStore::new(&config.sessions_dir).await.unwrap();
        let workflow = StoryWorkflow::new(
            Arc::new(store),
            ClipPlanner::new(Arc::new(UnavailableCompletion)),
            runner.clone(),
            config.upload_dir.clone(),
        )
        .with_default_api_key(config.default_api_key.clone())
        .with_clip_limits(config.default_clips, config.max_clips);

        let state = Arc::new(AppState {
            config,
            workflow,
            media_tool: "ffmpeg version test".to_string(),
        });

        Self { dir, state, runner }
    }

    pub fn router(&self) -> axum::Router {
        clip_chain::build_router(self.state.clone())
    }

    pub fn workflow(&self) -> &StoryWorkflow {
        &self.state.workflow
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state.config.sessions_dir.clone()
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.state.config.upload_dir.clone()
    }

    /// Session with a PNG starting image and a fallback plan
    pub async fn create_session(&self, description: &str, num_clips: usize) -> String {
        self.workflow()
            .create_session(CreateSession {
                api_key: Some("sk-test".to_string()),
                scene_description: description.to_string(),
                num_clips: Some(num_clips),
                image: Some(ImageSource::Upload {
                    filename: "start.png".to_string(),
                    bytes: png_bytes(),
                }),
            })
            .await
            .unwrap()
    }

    pub async fn upload(&self, session_id: &str, step: usize) -> Result<clip_chain::types::UploadOutcome, clip_chain::error::WorkflowError> {
        let clip = format!("clip {}", step).into_bytes();
        self.workflow()
            .ingest_step_video(session_id, step, "clip.mp4", clip.as_slice())
            .await
    }
}

pub fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_pixel(16, 9, Rgba([30, 144, 255, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub const BOUNDARY: &str = "clipchain-test-boundary";

/// A multipart/form-data part
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
