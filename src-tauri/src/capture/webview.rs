//! Camera backend whose device lives in the webview.
//!
//! The webview owns the `getUserMedia` stream and its `<video>` element.
//! Rust drives the lifecycle through events and receives frames back:
//!   camera-start { facingMode }  → webview requests the stream
//!   camera_started / camera_failed commands → readiness or denial
//!   capture_photo command (canvas data URL) → `push_frame`
//!   camera-stop → webview stops every track

use super::{CameraBackend, CameraStream, CaptureError, Facing, ImagePayload};
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tauri::{AppHandle, Emitter};

#[derive(Default)]
struct Shared {
    live: AtomicBool,
    frame: Mutex<Option<DynamicImage>>,
}

impl Shared {
    fn clear(&self) {
        self.live.store(false, Ordering::SeqCst);
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    facing_mode: &'static str,
}

pub struct WebviewCamera {
    app: AppHandle,
    shared: Arc<Shared>,
}

impl WebviewCamera {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            shared: Arc::new(Shared::default()),
        }
    }

    /// The webview reported its video element is playing.
    pub fn mark_live(&self) {
        self.shared.live.store(true, Ordering::SeqCst);
    }

    /// Hand over the frame the webview drew from its video element.
    /// Nothing is stored if the frame does not decode.
    pub fn push_frame(&self, data_url: &str) -> Result<(), CaptureError> {
        let frame = decode_frame(data_url)?;
        *self.shared.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        Ok(())
    }
}

impl CameraBackend for WebviewCamera {
    fn open(&self, facing: Facing) -> Result<Box<dyn CameraStream>, CaptureError> {
        self.shared.clear();
        self.app
            .emit(
                "camera-start",
                StartRequest {
                    facing_mode: facing.as_constraint(),
                },
            )
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        log::info!("[CAMERA] Requested webview stream ({})", facing.as_constraint());
        Ok(Box::new(WebviewStream {
            app: self.app.clone(),
            shared: self.shared.clone(),
            stopped: false,
        }))
    }
}

struct WebviewStream {
    app: AppHandle,
    shared: Arc<Shared>,
    stopped: bool,
}

impl CameraStream for WebviewStream {
    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }

    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        self.shared
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no frame received".to_string()))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.clear();
        if let Err(e) = self.app.emit("camera-stop", ()) {
            log::warn!("[CAMERA] Failed to emit camera-stop: {}", e);
        }
    }
}

/// Decode a canvas `toDataURL` snapshot.
fn decode_frame(data_url: &str) -> Result<DynamicImage, CaptureError> {
    let payload = ImagePayload::from_data_url(data_url)?;
    image::load_from_memory(payload.bytes())
        .map_err(|e| CaptureError::UnreadableFile(format!("bad camera frame: {}", e)))
}

/// Map a DOMException name from `getUserMedia` to a capture error.
pub fn media_error(name: &str, message: &str) -> CaptureError {
    match name {
        "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
            CaptureError::PermissionDenied
        }
        _ => CaptureError::DeviceUnavailable(format!("{}: {}", name, message)),
    }
}
