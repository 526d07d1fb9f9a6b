//! Image capture domain — public API.
//!
//! Owns both acquisition paths (file upload and live camera) and the
//! `ImagePayload` they produce. External code should only use the items
//! exported here.

mod camera;
pub(crate) mod payload;
mod upload;
#[cfg(feature = "desktop")]
pub mod webview;

pub use camera::{CameraBackend, CameraSlot, CameraStream, Facing, NoCamera};
pub use payload::{ImageMime, ImagePayload};
pub use upload::{load_image_file, ACCEPTED_EXTENSIONS};

/// Failures while acquiring an image. All of them are recoverable from the
/// UI: pick another file, or cancel the camera screen and retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("unreadable image file: {0}")]
    UnreadableFile(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera permission denied")]
    PermissionDenied,
}

impl CaptureError {
    /// Message shown inline to the user. Detail stays in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::UnreadableFile(_) => {
                "Could not read that file. Please choose a different image."
            }
            CaptureError::DeviceUnavailable(_) => "This device does not support camera access.",
            CaptureError::PermissionDenied => {
                "Could not access the camera. Please check camera permissions in your system settings."
            }
        }
    }
}
