//! File-upload acquisition.

use super::{CaptureError, ImagePayload};
use std::path::Path;

/// Extensions offered by the file picker.
pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff",
];

/// Read a user-selected file fully into memory and wrap it as an
/// `ImagePayload`.
///
/// The extension is only a first filter; the content itself must decode.
pub async fn load_image_file(path: impl AsRef<Path>) -> Result<ImagePayload, CaptureError> {
    let path = path.as_ref();
    let start = std::time::Instant::now();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        log::warn!("[CAPTURE] Rejected non-image file: {}", path.display());
        return Err(CaptureError::UnreadableFile(format!(
            "{} is not an image file",
            path.display()
        )));
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        log::error!("[CAPTURE] Failed to read {}: {}", path.display(), e);
        CaptureError::UnreadableFile(format!("{}: {}", path.display(), e))
    })?;

    // Decoding is CPU-bound; keep it off the async workers.
    let payload = tokio::task::spawn_blocking(move || ImagePayload::from_encoded(bytes))
        .await
        .map_err(|e| CaptureError::UnreadableFile(format!("decode task failed: {}", e)))??;

    let (width, height) = payload.dimensions();
    log::info!(
        "[CAPTURE] Loaded {} ({}x{}, {}, {} bytes) in {}ms",
        path.display(),
        width,
        height,
        payload.mime().as_str(),
        payload.bytes().len(),
        start.elapsed().as_millis()
    );
    Ok(payload)
}
