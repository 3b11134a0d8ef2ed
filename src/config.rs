// src/config.rs
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub sessions_dir: PathBuf,
    /// Used when a create request carries no credential of its own.
    pub default_api_key: Option<String>,
    pub openai_base_url: String,
    pub planner_model: String,
    pub planner_temperature: f32,
    pub planner_timeout: Duration,
    pub planner_retry_budget: Duration,
    pub ffmpeg_path: PathBuf,
    pub default_clips: usize,
    pub max_clips: usize,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host: IpAddr = parse_or(&value, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = parse_or(&value, "PORT", 5000)?;

        let max_clips: usize = parse_or(&value, "MAX_CLIPS", 12)?;
        if max_clips == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CLIPS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let default_clips: usize = parse_or(&value, "DEFAULT_CLIPS", 4)?;
        if default_clips == 0 || default_clips > max_clips {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_CLIPS",
                value: default_clips.to_string(),
                reason: format!("must be between 1 and {}", max_clips),
            });
        }

        let max_upload_mb: usize = parse_or(&value, "MAX_UPLOAD_MB", 500)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid {
                key: "MAX_UPLOAD_MB",
                value: max_upload_mb.to_string(),
                reason: "too large".to_string(),
            })?;

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            upload_dir: value("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()).into(),
            sessions_dir: value("SESSIONS_DIR").unwrap_or_else(|| "sessions".to_string()).into(),
            default_api_key: value("OPENAI_API_KEY").or_else(|| value("VIDEO_API_KEY")),
            openai_base_url: value("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            planner_model: value("PLANNER_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            planner_temperature: parse_or(&value, "PLANNER_TEMPERATURE", 0.7)?,
            planner_timeout: Duration::from_secs(parse_or(&value, "PLANNER_TIMEOUT_SECS", 60)?),
            planner_retry_budget: Duration::from_secs(parse_or(&value, "PLANNER_RETRY_SECS", 20)?),
            ffmpeg_path: value("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()).into(),
            default_clips,
            max_clips,
            max_upload_bytes,
        })
    }
}

fn parse_or<T, F>(value: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match value(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
