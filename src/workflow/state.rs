// SessionRecord - step progression and artifacts of one video story
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fields needed to open a new session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub scene_description: String,
    pub starting_image_path: PathBuf,
    pub prompts: Vec<String>,
    pub num_clips: usize,
    pub api_key: String,
}

/// One end-to-end video-assembly job.
///
/// `uploaded_videos` and `last_frames` grow together, one entry per finished
/// step, and `current_step` is always `min(uploaded + 1, num_clips)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub scene_description: String,
    pub starting_image_path: PathBuf,
    pub prompts: Vec<String>,
    pub current_step: usize,
    pub uploaded_videos: Vec<PathBuf>,
    pub last_frames: Vec<PathBuf>,
    pub num_clips: usize,

    /// Credential for the text-generation API. Memory only.
    #[serde(skip)]
    pub api_key: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: String, new: NewSession) -> Self {
        Self {
            session_id,
            scene_description: new.scene_description,
            starting_image_path: new.starting_image_path,
            prompts: new.prompts,
            current_step: 1,
            uploaded_videos: Vec::new(),
            last_frames: Vec::new(),
            num_clips: new.num_clips,
            api_key: new.api_key,
            created_at: Utc::now(),
        }
    }

    /// Overwrite only the fields named in `update`
    pub fn apply_update(&mut self, update: SessionUpdate) {
        if let Some(description) = update.scene_description {
            self.scene_description = description;
        }
        if let Some(path) = update.starting_image_path {
            self.starting_image_path = path;
        }
        if let Some(prompts) = update.prompts {
            self.prompts = prompts;
        }
        if let Some(api_key) = update.api_key {
            self.api_key = api_key;
        }
    }

    /// Record one finished step and advance, capped at the clip count
    pub fn record_upload(&mut self, video: PathBuf, frame: PathBuf) {
        self.uploaded_videos.push(video);
        self.last_frames.push(frame);
        if self.current_step < self.num_clips {
            self.current_step += 1;
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.uploaded_videos.len()
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_videos.len() >= self.num_clips
    }

    pub fn is_valid_step(&self, step: usize) -> bool {
        step >= 1 && step <= self.num_clips
    }

    /// Steps still waiting for a clip, in order
    pub fn missing_steps(&self) -> Vec<usize> {
        (self.completed_steps() + 1..=self.num_clips).collect()
    }

    pub fn prompt_for_step(&self, step: usize) -> Option<&str> {
        step.checked_sub(1)
            .and_then(|i| self.prompts.get(i))
            .map(String::as_str)
    }

    /// Step 1 starts from the submitted image; step N from step N-1's last frame.
    pub fn source_image_for_step(&self, step: usize) -> Option<&Path> {
        match step {
            0 => None,
            1 => Some(self.starting_image_path.as_path()),
            n => self.last_frames.get(n - 2).map(PathBuf::as_path),
        }
    }

    /// The only step that may receive a clip next
    pub fn next_pending_step(&self) -> Option<usize> {
        if self.is_complete() {
            None
        } else {
            Some(self.completed_steps() + 1)
        }
    }
}

/// Partial update payload; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub scene_description: Option<String>,
    pub starting_image_path: Option<PathBuf>,
    pub prompts: Option<Vec<String>>,
    pub api_key: Option<String>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_starting_image(mut self, path: PathBuf) -> Self {
        self.starting_image_path = Some(path);
        self
    }
}
