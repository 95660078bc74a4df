use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use settings::CaptureFormat;

/// Picks the encoder from the file extension.
pub fn format_for_path(path: &Path) -> Result<CaptureFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => Ok(CaptureFormat::Png),
        Some("jpg") | Some("jpeg") => Ok(CaptureFormat::Jpeg),
        Some(other) => bail!("unsupported output format '.{other}'; use .png, .jpg or .jpeg"),
        None => bail!("output path {} has no extension", path.display()),
    }
}

pub fn save_image(
    image: RgbaImage,
    path: &Path,
    format: CaptureFormat,
    jpeg_quality: u8,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match format {
        CaptureFormat::Png => image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))?,
        CaptureFormat::Jpeg => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            JpegEncoder::new_with_quality(BufWriter::new(file), jpeg_quality)
                .encode_image(&rgb)
                .with_context(|| format!("failed to encode {}", path.display()))?;
        }
    }
    Ok(())
}

/// `funhouse-<effect>-<timestamp>.<ext>` inside `directory`.
pub fn capture_path(directory: &Path, effect: &str, format: CaptureFormat) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    directory.join(format!("funhouse-{effect}-{stamp}.{}", format.extension()))
}
