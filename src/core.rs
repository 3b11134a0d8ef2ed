// src/core.rs

use crate::utils::{path_arg, MediaError, MediaRunner};
use std::path::{Path, PathBuf};

pub const CONCAT_MANIFEST: &str = "list.txt";

/// Seek offset from the end of the stream used to grab the final frame.
const LAST_FRAME_OFFSET: &str = "-0.05";

/// Stream-copy the video into `output_video` without its audio track.
pub async fn strip_audio(
    runner: &dyn MediaRunner,
    input_video: &Path,
    output_video: &Path,
) -> Result<(), MediaError> {
    tracing::info!(
        "Stripping audio: {} -> {}",
        input_video.display(),
        output_video.display()
    );
    let args = vec![
        "-i".to_string(),
        path_arg(input_video),
        "-c".to_string(),
        "copy".to_string(),
        "-an".to_string(),
        path_arg(output_video),
    ];
    runner.run(&args, None).await
}

/// Decode one frame roughly 50ms before the end of the stream into a still.
pub async fn extract_last_frame(
    runner: &dyn MediaRunner,
    input_video: &Path,
    output_image: &Path,
) -> Result<(), MediaError> {
    tracing::info!("Extracting last frame from {}", input_video.display());
    let args = vec![
        "-sseof".to_string(),
        LAST_FRAME_OFFSET.to_string(),
        "-i".to_string(),
        path_arg(input_video),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        path_arg(output_image),
    ];
    runner.run(&args, None).await
}

/// Join `video_files` in order into `output_video` with the concat demuxer.
///
/// The demuxer resolves manifest entries relative to the manifest, so every
/// input must live in the output's directory; the tool runs with that
/// directory as its working directory. The manifest is rewritten on every call
/// and removed afterwards.
pub async fn concat_videos(
    runner: &dyn MediaRunner,
    video_files: &[PathBuf],
    output_video: &Path,
) -> Result<(), MediaError> {
    let working_dir = output_video.parent().unwrap_or_else(|| Path::new("."));
    tracing::info!(
        "Concatenating {} videos into {}",
        video_files.len(),
        output_video.display()
    );

    let mut manifest = String::new();
    for video in video_files {
        let in_working_dir = video.parent().map(|p| p == working_dir).unwrap_or(false);
        let name = match (in_working_dir, video.file_name()) {
            (true, Some(name)) => name.to_string_lossy().to_string(),
            _ => return Err(MediaError::ForeignInput(video.clone())),
        };
        manifest.push_str(&format!("file '{}'\n", name.replace('\'', "'\\''")));
    }

    let manifest_path = working_dir.join(CONCAT_MANIFEST);
    tokio::fs::write(&manifest_path, manifest)
        .await
        .map_err(MediaError::Manifest)?;

    let output_name = output_video
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_arg(output_video));

    let args = vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        CONCAT_MANIFEST.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output_name,
    ];

    let result = runner.run(&args, Some(working_dir)).await;
    tokio::fs::remove_file(&manifest_path).await.ok();
    result
}
