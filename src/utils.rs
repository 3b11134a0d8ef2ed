// utils.rs - FFmpeg execution and file helpers
use async_trait::async_trait;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;

pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("FFmpeg error ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("Failed to write concat manifest: {0}")]
    Manifest(#[source] std::io::Error),
    #[error("Clip {0} is outside the session working directory")]
    ForeignInput(PathBuf),
}

/// Runs the external media tool. Implementations signal failure through
/// `MediaError` rather than by leaving output files missing.
#[async_trait]
pub trait MediaRunner: Send + Sync {
    async fn run(&self, args: &[String], working_dir: Option<&Path>) -> Result<(), MediaError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Check that the configured binary can be executed
    pub async fn check_available(&self) -> Result<String, MediaError> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map_err(|e| MediaError::Spawn {
                program: self.binary.display().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl MediaRunner for FfmpegRunner {
    async fn run(&self, args: &[String], working_dir: Option<&Path>) -> Result<(), MediaError> {
        let mut command = Command::new(&self.binary);
        // -y: overwrite outputs without asking
        command.arg("-y").args(args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(binary = %self.binary.display(), ?args, ?working_dir, "Executing FFmpeg");

        let output = command.output().await.map_err(|e| MediaError::Spawn {
            program: self.binary.display().to_string(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(status = %output.status, "FFmpeg stderr: {}", stderr);
            return Err(MediaError::Failed {
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

/// Get lowercase file extension from a file name
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn has_allowed_extension(filename: &str, allowed: &[&str]) -> bool {
    match get_file_extension(filename) {
        Some(ext) => allowed.contains(&ext.as_str()),
        None => false,
    }
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Read an image and encode it as a `data:` URL for inline display and copying
pub async fn image_to_data_url(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "jpeg".to_string());
    let mime = if ext == "jpg" { "jpeg".to_string() } else { ext };

    Ok(format!(
        "data:image/{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions_are_case_insensitive() {
        assert!(has_allowed_extension("clip.MP4", ALLOWED_VIDEO_EXTENSIONS));
        assert!(has_allowed_extension("take two.mov", ALLOWED_VIDEO_EXTENSIONS));
        assert!(!has_allowed_extension("clip.mkv", ALLOWED_VIDEO_EXTENSIONS));
        assert!(!has_allowed_extension("noextension", ALLOWED_VIDEO_EXTENSIONS));
        assert!(has_allowed_extension("cat.JPEG", ALLOWED_IMAGE_EXTENSIONS));
        assert!(!has_allowed_extension("cat.gif", ALLOWED_IMAGE_EXTENSIONS));
    }

    #[tokio::test]
    async fn test_image_to_data_url_uses_jpeg_mime_for_jpg() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("frame.jpg");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let url = image_to_data_url(&path).await.unwrap();
        assert_eq!(url, "data:image/jpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_error() {
        let runner = FfmpegRunner::new("/nonexistent/ffmpeg-binary");
        let err = runner.run(&["-version".to_string()], None).await.unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
    }
}
