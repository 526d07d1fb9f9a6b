//! Live camera acquisition.
//!
//! A `CameraBackend` opens a `CameraStream`; the stream is wrapped in a lease
//! that stops the device when dropped. `CameraSlot` holds at most one lease,
//! so two capture attempts can never own the device at the same time.

use super::{CaptureError, ImagePayload};
use image::DynamicImage;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which camera to ask for. Rear-facing is preferred for skin photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    #[default]
    Environment,
    User,
}

impl Facing {
    /// The `facingMode` constraint understood by webview media APIs.
    pub fn as_constraint(self) -> &'static str {
        match self {
            Facing::Environment => "environment",
            Facing::User => "user",
        }
    }
}

/// An open camera device.
pub trait CameraStream: Send {
    /// Whether frames are flowing yet. Some backends report readiness later.
    fn is_live(&self) -> bool {
        true
    }

    /// Grab the current frame at the device's native resolution.
    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError>;

    /// Stop every track of the device. Must be idempotent.
    fn stop(&mut self);
}

/// Source of camera streams.
pub trait CameraBackend: Send + Sync {
    fn open(&self, facing: Facing) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Backend for environments with no capture API at all.
pub struct NoCamera;

impl CameraBackend for NoCamera {
    fn open(&self, _facing: Facing) -> Result<Box<dyn CameraStream>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "no camera backend in this build".to_string(),
        ))
    }
}

/// Scoped ownership of an open stream. Dropping the lease stops the device.
struct CameraLease {
    stream: Box<dyn CameraStream>,
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.stream.stop();
        log::info!("[CAMERA] Device released");
    }
}

/// Exclusive holder for the single camera lease of a session.
#[derive(Default)]
pub struct CameraSlot {
    lease: Mutex<Option<CameraLease>>,
}

impl CameraSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Option<CameraLease>> {
        self.lease.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the camera and keep the lease. Any lease still held is released
    /// first. Returns whether the stream is already live.
    pub fn acquire(
        &self,
        backend: &dyn CameraBackend,
        facing: Facing,
    ) -> Result<bool, CaptureError> {
        let mut guard = self.guard();
        if guard.take().is_some() {
            log::warn!("[CAMERA] Replacing a lease that was never released");
        }

        let stream = backend.open(facing).map_err(|e| {
            log::warn!("[CAMERA] Open failed ({:?}): {}", facing, e);
            e
        })?;
        let live = stream.is_live();
        log::info!("[CAMERA] Device acquired ({:?}, live={})", facing, live);
        *guard = Some(CameraLease { stream });
        Ok(live)
    }

    /// Snapshot the current frame into a JPEG payload. The lease is kept.
    pub fn snapshot(&self) -> Result<ImagePayload, CaptureError> {
        let mut guard = self.guard();
        let lease = guard
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable("camera is not open".to_string()))?;
        let frame = lease.stream.current_frame()?;
        let payload = ImagePayload::from_frame(&frame)?;
        let (width, height) = payload.dimensions();
        log::info!(
            "[CAMERA] Captured {}x{} frame ({} bytes)",
            width,
            height,
            payload.bytes().len()
        );
        Ok(payload)
    }

    /// Release the device if held. Returns whether anything was released.
    pub fn release(&self) -> bool {
        let lease = self.guard().take();
        lease.is_some()
    }

    pub fn is_held(&self) -> bool {
        self.guard().is_some()
    }
}
