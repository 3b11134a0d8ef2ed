// starting_image.rs - Acquire and normalize the image the first clip starts from
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::{get_file_extension, ALLOWED_IMAGE_EXTENSIONS};

pub const STARTING_IMAGE_FILE: &str = "starting_image.jpg";
const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Unsupported image type '{0}'. Please upload JPG, JPEG or PNG.")]
    UnsupportedType(String),
    #[error("Starting image is empty")]
    Empty,
    #[error("Failed to download image: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to download image from {url}: HTTP {status}")]
    FetchStatus { url: String, status: u16 },
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Image conversion task failed: {0}")]
    Task(String),
    #[error("Failed to write starting image: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the starting image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    Upload { filename: String, bytes: Vec<u8> },
    Url(String),
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Upload { filename, bytes } => format!("upload {} ({} bytes)", filename, bytes.len()),
            ImageSource::Url(url) => format!("url {}", url),
        }
    }
}

/// Store the image from `source` as `<work_dir>/starting_image.jpg`.
pub async fn acquire_starting_image(
    client: &reqwest::Client,
    source: ImageSource,
    work_dir: &Path,
) -> Result<PathBuf, ImageError> {
    tracing::info!("Acquiring starting image from {}", source.describe());

    let bytes = match source {
        ImageSource::Upload { filename, bytes } => {
            let ext = get_file_extension(&filename).unwrap_or_default();
            if !ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ImageError::UnsupportedType(filename));
            }
            bytes
        }
        ImageSource::Url(url) => fetch_image(client, &url).await?,
    };

    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let jpeg = normalize_to_jpeg(bytes).await?;
    tokio::fs::create_dir_all(work_dir).await?;
    let image_path = work_dir.join(STARTING_IMAGE_FILE);
    tokio::fs::write(&image_path, jpeg).await?;

    tracing::info!("Starting image saved to {}", image_path.display());
    Ok(image_path)
}

async fn fetch_image(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, ImageError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ImageError::FetchStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// JPEG bytes pass through untouched; anything else is decoded and re-encoded
/// as an RGB JPEG.
pub async fn normalize_to_jpeg(bytes: Vec<u8>) -> Result<Vec<u8>, ImageError> {
    if matches!(image::guess_format(&bytes), Ok(ImageFormat::Jpeg)) {
        return Ok(bytes);
    }

    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ImageError> {
        let decoded = image::load_from_memory(&bytes)?;
        let rgb = decoded.to_rgb8();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)?;
        Ok(out)
    })
    .await
    .map_err(|e| ImageError::Task(e.to_string()))?
}
