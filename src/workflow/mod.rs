// Story workflow - session creation, per-step ingestion and final assembly
pub mod checkpoint;
pub mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::core::{concat_videos, extract_last_frame, strip_audio};
use crate::error::WorkflowError;
use crate::planner::ClipPlanner;
use crate::starting_image::acquire_starting_image;
use crate::types::{CombineView, CreateSession, PlanView, StepView, UploadOutcome};
use crate::utils::{has_allowed_extension, image_to_data_url, MediaRunner, ALLOWED_VIDEO_EXTENSIONS};
use checkpoint::{SessionLocks, SessionStore};
use state::{NewSession, SessionRecord, SessionUpdate};

pub const FINAL_OUTPUT_FILE: &str = "final_output.mp4";

/// Working directory holding one session's media
pub fn session_dir(upload_dir: &Path, session_id: &str) -> PathBuf {
    upload_dir.join(session_id)
}

pub fn raw_video_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("step_{}.mp4", step))
}

pub fn silent_video_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("step_{}_silent.mp4", step))
}

pub fn frame_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("step_{}_frame.jpg", step))
}

pub struct StoryWorkflow {
    store: Arc<dyn SessionStore>,
    planner: ClipPlanner,
    media: Arc<dyn MediaRunner>,
    http_client: reqwest::Client,
    locks: SessionLocks,
    upload_dir: PathBuf,
    default_api_key: Option<String>,
    default_clips: usize,
    max_clips: usize,
}

impl StoryWorkflow {
    pub fn new(
        store: Arc<dyn SessionStore>,
        planner: ClipPlanner,
        media: Arc<dyn MediaRunner>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            planner,
            media,
            http_client: reqwest::Client::new(),
            locks: SessionLocks::new(),
            upload_dir: upload_dir.into(),
            default_api_key: None,
            default_clips: 4,
            max_clips: 12,
        }
    }

    pub fn with_default_api_key(mut self, api_key: Option<String>) -> Self {
        self.default_api_key = api_key;
        self
    }

    pub fn with_clip_limits(mut self, default_clips: usize, max_clips: usize) -> Self {
        self.default_clips = default_clips;
        self.max_clips = max_clips;
        self
    }

    pub fn default_clips(&self) -> usize {
        self.default_clips
    }

    pub fn max_clips(&self) -> usize {
        self.max_clips
    }

    /// Validate the form, plan the clips, create the record and fetch the
    /// starting image. A session whose image cannot be acquired or recorded
    /// is discarded.
    pub async fn create_session(&self, request: CreateSession) -> Result<String, WorkflowError> {
        let api_key = request
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.default_api_key.clone())
            .ok_or_else(|| WorkflowError::Validation("OpenAI API key is required".to_string()))?;

        let scene_description = request.scene_description.trim().to_string();
        if scene_description.is_empty() {
            return Err(WorkflowError::Validation("Scene description is required".to_string()));
        }

        let num_clips = request.num_clips.unwrap_or(self.default_clips);
        if num_clips == 0 || num_clips > self.max_clips {
            return Err(WorkflowError::Validation(format!(
                "Number of clips must be between 1 and {}",
                self.max_clips
            )));
        }

        let image = request.image.ok_or_else(|| {
            WorkflowError::Validation(
                "Starting image is required (upload file or provide URL)".to_string(),
            )
        })?;

        let prompts = self.planner.plan(&api_key, &scene_description, num_clips).await;

        let session_id = self
            .store
            .create(NewSession {
                scene_description,
                starting_image_path: PathBuf::new(),
                prompts,
                num_clips,
                api_key,
            })
            .await?;

        let dir = session_dir(&self.upload_dir, &session_id);
        let image_path = match acquire_starting_image(&self.http_client, image, &dir).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Discarding session {}: {}", session_id, e);
                self.discard(&session_id, &dir).await;
                return Err(e.into());
            }
        };

        let updated = self
            .store
            .update(&session_id, SessionUpdate::new().with_starting_image(image_path))
            .await;
        match updated {
            Ok(true) => {}
            Ok(false) => {
                warn!("Session {} vanished before its starting image was recorded", session_id);
                self.discard(&session_id, &dir).await;
                return Err(WorkflowError::SessionNotFound(session_id));
            }
            Err(e) => {
                warn!("Discarding session {}: {}", session_id, e);
                self.discard(&session_id, &dir).await;
                return Err(e.into());
            }
        }

        info!("Session {} ready with {} clips", session_id, num_clips);
        Ok(session_id)
    }

    async fn discard(&self, session_id: &str, dir: &Path) {
        if let Err(e) = self.store.remove(session_id).await {
            error!("Failed to remove session record {}: {}", session_id, e);
        }
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Failed to remove session directory {}: {}", dir.display(), e);
            }
        }
    }

    pub async fn session(&self, session_id: &str) -> Result<SessionRecord, WorkflowError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(session_id.to_string()))
    }

    pub async fn plan_view(&self, session_id: &str) -> Result<PlanView, WorkflowError> {
        let session = self.session(session_id).await?;
        let starting_image_data_url = if session.starting_image_path.is_file() {
            Some(image_to_data_url(&session.starting_image_path).await?)
        } else {
            None
        };
        Ok(PlanView {
            session,
            starting_image_data_url,
        })
    }

    fn source_image(session: &SessionRecord, step: usize) -> Result<PathBuf, WorkflowError> {
        if !session.is_valid_step(step) {
            return Err(WorkflowError::InvalidStep {
                step,
                num_clips: session.num_clips,
            });
        }
        let path = session
            .source_image_for_step(step)
            .ok_or(WorkflowError::StepNotReady {
                step,
                expected: session.completed_steps() + 1,
            })?
            .to_path_buf();
        if !path.is_file() {
            return Err(WorkflowError::FileMissing(path));
        }
        Ok(path)
    }

    /// Path of the image step `step` starts from
    pub async fn step_image(&self, session_id: &str, step: usize) -> Result<PathBuf, WorkflowError> {
        let session = self.session(session_id).await?;
        Self::source_image(&session, step)
    }

    pub async fn step_view(&self, session_id: &str, step: usize) -> Result<StepView, WorkflowError> {
        let session = self.session(session_id).await?;
        let image_path = Self::source_image(&session, step)?;
        let prompt = session
            .prompt_for_step(step)
            .ok_or(WorkflowError::InvalidStep {
                step,
                num_clips: session.num_clips,
            })?
            .to_string();

        Ok(StepView {
            session_id: session.session_id.clone(),
            step,
            num_clips: session.num_clips,
            prompt,
            image_data_url: image_to_data_url(&image_path).await?,
            is_uploaded: session.completed_steps() >= step,
        })
    }

    /// Save the clip for `step`, strip its audio, grab its last frame and
    /// advance the session. Holds the session lock throughout.
    pub async fn ingest_step_video<R>(
        &self,
        session_id: &str,
        step: usize,
        filename: &str,
        mut video: R,
    ) -> Result<UploadOutcome, WorkflowError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // Unknown ids never get a lock entry
        self.session(session_id).await?;
        let _guard = self.locks.acquire(session_id).await;
        let session = self.session(session_id).await?;

        if !session.is_valid_step(step) {
            return Err(WorkflowError::InvalidStep {
                step,
                num_clips: session.num_clips,
            });
        }
        if !has_allowed_extension(filename, ALLOWED_VIDEO_EXTENSIONS) {
            return Err(WorkflowError::Validation(
                "Invalid file type. Please upload MP4, MOV, or AVI.".to_string(),
            ));
        }
        let expected = session.completed_steps() + 1;
        if step < expected {
            return Err(WorkflowError::AlreadyUploaded(step));
        }
        if step > expected {
            return Err(WorkflowError::StepNotReady { step, expected });
        }

        let dir = session_dir(&self.upload_dir, session_id);
        tokio::fs::create_dir_all(&dir).await?;

        let raw_path = raw_video_path(&dir, step);
        let mut file = tokio::fs::File::create(&raw_path).await?;
        let written = tokio::io::copy(&mut video, &mut file).await?;
        file.flush().await?;
        drop(file);

        if written == 0 {
            tokio::fs::remove_file(&raw_path).await.ok();
            return Err(WorkflowError::Validation("No video file selected".to_string()));
        }
        info!("Saved step {} of session {} ({} bytes)", step, session_id, written);

        let silent_path = silent_video_path(&dir, step);
        strip_audio(self.media.as_ref(), &raw_path, &silent_path).await?;

        let frame = frame_path(&dir, step);
        extract_last_frame(self.media.as_ref(), &silent_path, &frame).await?;

        if !self.store.append_upload(session_id, silent_path, frame).await? {
            return Err(WorkflowError::SessionNotFound(session_id.to_string()));
        }

        if step < session.num_clips {
            Ok(UploadOutcome::NextStep(step + 1))
        } else {
            Ok(UploadOutcome::ReadyToCombine)
        }
    }

    fn require_complete(session: &SessionRecord) -> Result<(), WorkflowError> {
        if session.is_complete() {
            Ok(())
        } else {
            Err(WorkflowError::Incomplete {
                missing: session.missing_steps(),
            })
        }
    }

    pub async fn combine_view(&self, session_id: &str) -> Result<CombineView, WorkflowError> {
        let session = self.session(session_id).await?;
        Self::require_complete(&session)?;

        let final_output = session_dir(&self.upload_dir, session_id).join(FINAL_OUTPUT_FILE);
        let clips = session
            .uploaded_videos
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect();

        Ok(CombineView {
            session_id: session.session_id.clone(),
            num_clips: session.num_clips,
            clips,
            is_combined: final_output.is_file(),
            final_output,
        })
    }

    /// Concatenate every audio-free clip into `final_output.mp4`. Re-running
    /// overwrites the previous output.
    pub async fn generate_final(&self, session_id: &str) -> Result<PathBuf, WorkflowError> {
        // Unknown ids never get a lock entry
        self.session(session_id).await?;
        let _guard = self.locks.acquire(session_id).await;
        let session = self.session(session_id).await?;
        Self::require_complete(&session)?;

        for video in &session.uploaded_videos {
            if !video.is_file() {
                return Err(WorkflowError::FileMissing(video.clone()));
            }
        }

        let final_output = session_dir(&self.upload_dir, session_id).join(FINAL_OUTPUT_FILE);
        concat_videos(self.media.as_ref(), &session.uploaded_videos, &final_output).await?;

        info!("Final video for session {} written to {}", session_id, final_output.display());
        Ok(final_output)
    }

    pub async fn final_output(&self, session_id: &str) -> Result<PathBuf, WorkflowError> {
        self.session(session_id).await?;
        let final_output = session_dir(&self.upload_dir, session_id).join(FINAL_OUTPUT_FILE);
        if !final_output.is_file() {
            return Err(WorkflowError::FileMissing(final_output));
        }
        Ok(final_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{CompletionClient, PlannerError};
    use crate::utils::MediaError;
    use async_trait::async_trait;
    use checkpoint::FileSessionStore;

    struct NoMedia;

    #[async_trait]
    impl MediaRunner for NoMedia {
        async fn run(&self, _args: &[String], _working_dir: Option<&Path>) -> Result<(), MediaError> {
            Ok(())
        }
    }

    struct NoPlanner;

    #[async_trait]
    impl CompletionClient for NoPlanner {
        async fn complete(&self, _api_key: &str, _system: &str, _user: &str) -> Result<String, PlannerError> {
            Err(PlannerError::EmptyContent)
        }
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_lock_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions")).await.unwrap();
        let workflow = StoryWorkflow::new(
            Arc::new(store),
            ClipPlanner::new(Arc::new(NoPlanner)),
            Arc::new(NoMedia),
            dir.path().join("uploads"),
        );

        for i in 0..200 {
            let id = format!("bogus-{}", i);
            let err = workflow.generate_final(&id).await.unwrap_err();
            assert!(matches!(err, WorkflowError::SessionNotFound(_)));
            let err = workflow
                .ingest_step_video(&uuid::Uuid::new_v4().to_string(), 1, "clip.mp4", &b"data"[..])
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::SessionNotFound(_)));
        }
        assert!(workflow.locks.is_empty());
    }

    #[test]
    fn test_step_file_names() {
        let dir = session_dir(Path::new("uploads"), "abc");
        assert_eq!(dir, PathBuf::from("uploads/abc"));
        assert_eq!(raw_video_path(&dir, 2), PathBuf::from("uploads/abc/step_2.mp4"));
        assert_eq!(silent_video_path(&dir, 2), PathBuf::from("uploads/abc/step_2_silent.mp4"));
        assert_eq!(frame_path(&dir, 2), PathBuf::from("uploads/abc/step_2_frame.jpg"));
    }
}
