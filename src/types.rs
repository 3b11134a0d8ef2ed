// types.rs - Request and view structures shared by the workflow and handlers
use serde::Serialize;
use std::path::PathBuf;

use crate::starting_image::ImageSource;
use crate::workflow::state::SessionRecord;

/// Everything the scene form submits
#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    pub api_key: Option<String>,
    pub scene_description: String,
    pub num_clips: Option<usize>,
    pub image: Option<ImageSource>,
}

#[derive(Debug, Clone)]
pub struct PlanView {
    pub session: SessionRecord,
    pub starting_image_data_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StepView {
    pub session_id: String,
    pub step: usize,
    pub num_clips: usize,
    pub prompt: String,
    pub image_data_url: String,
    pub is_uploaded: bool,
}

#[derive(Debug, Clone)]
pub struct CombineView {
    pub session_id: String,
    pub num_clips: usize,
    pub clips: Vec<String>,
    pub final_output: PathBuf,
    pub is_combined: bool,
}

/// Where the user goes after a successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    NextStep(usize),
    ReadyToCombine,
}

/// Session record as exposed over the JSON API; the credential is never included.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub is_complete: bool,
    pub missing_steps: Vec<usize>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(session: SessionRecord) -> Self {
        Self {
            is_complete: session.is_complete(),
            missing_steps: session.missing_steps(),
            session,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub media_tool: String,
    pub planner_model: String,
    pub default_api_key: bool,
    pub max_clips: usize,
}
