//! Async driver around the session state machine.
//!
//! Performs the side effects the transitions ask for (file reads, camera
//! leases, the analysis call) and feeds their outcomes back as events. The
//! state lock is never held across an await.

use super::state::{
    transition, AnalysisTicket, Event, Outcome, Rejection, Screen, SessionSnapshot, SessionState,
};
use crate::capture::{self, CameraBackend, CameraSlot, CaptureError, Facing};
use crate::llm::Analyzer;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub struct SessionController {
    state: Mutex<SessionState>,
    camera: CameraSlot,
    backend: Arc<dyn CameraBackend>,
    analyzer: Arc<dyn Analyzer>,
    next_ticket: AtomicU64,
}

impl SessionController {
    pub fn new(backend: Arc<dyn CameraBackend>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            camera: CameraSlot::new(),
            backend,
            analyzer,
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether the camera device is currently leased.
    pub fn camera_held(&self) -> bool {
        self.camera.is_held()
    }

    fn dispatch(&self, event: Event) -> Outcome {
        let name = event.name();
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let step = transition(std::mem::take(&mut *guard), event);
        *guard = step.state;
        let off_camera = guard.screen() != Screen::Camera;

        match &step.outcome {
            Outcome::Applied | Outcome::StartAnalysis(_) => {
                log::info!("[SESSION] {} -> {:?}", name, guard.screen());
            }
            Outcome::Rejected(reason) => {
                log::warn!("[SESSION] {} rejected: {}", name, reason);
            }
            Outcome::Stale => {
                log::info!("[SESSION] {} discarded (stale)", name);
            }
        }
        drop(guard);

        // The device belongs to the Camera screen and never outlives it.
        if off_camera && self.camera.release() {
            log::info!("[CAMERA] Lease dropped after {} left the Camera screen", name);
        }
        step.outcome
    }

    /// Upload mode: read the file at `path` and show it in Preview. Only
    /// accepted on the Welcome screen.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Outcome {
        let screen = self.state().screen();
        if screen != Screen::Welcome {
            let reason = Rejection::InvalidTransition {
                event: "image_uploaded",
                screen,
            };
            log::warn!("[SESSION] upload rejected: {}", reason);
            return Outcome::Rejected(reason);
        }
        match capture::load_image_file(path).await {
            Ok(image) => self.dispatch(Event::ImageUploaded(image)),
            Err(e) => {
                log::warn!("[CAPTURE] Upload failed: {}", e);
                self.dispatch(Event::UploadFailed(e))
            }
        }
    }

    /// Enter the Camera screen and open the device.
    pub fn open_camera(&self, facing: Facing) -> Outcome {
        let outcome = self.dispatch(Event::CameraRequested);
        if outcome != Outcome::Applied {
            return outcome;
        }
        let outcome = match self.camera.acquire(self.backend.as_ref(), facing) {
            Ok(true) => self.dispatch(Event::CameraReady),
            // Readiness is reported later through `camera_ready`.
            Ok(false) => outcome,
            Err(e) => self.dispatch(Event::CameraFailed(e)),
        };
        // Cancelled or reset while the device was opening.
        if self.state().screen() != Screen::Camera && self.camera.release() {
            log::info!("[CAMERA] Camera screen left during open, lease dropped");
        }
        outcome
    }

    /// The open stream started delivering frames.
    pub fn camera_ready(&self) -> Outcome {
        if !self.camera.is_held() {
            return self.dispatch(Event::CameraFailed(CaptureError::DeviceUnavailable(
                "camera reported ready without an open lease".to_string(),
            )));
        }
        self.dispatch(Event::CameraReady)
    }

    /// The device failed after it was opened (denied late, unplugged).
    pub fn camera_failed(&self, error: CaptureError) -> Outcome {
        self.camera.release();
        self.dispatch(Event::CameraFailed(error))
    }

    /// Snapshot the live stream and move to Preview. The device is released
    /// once the image is stored. A bad frame is refused on its own and the
    /// stream stays open.
    pub fn capture_photo(&self) -> Outcome {
        let state = self.state();
        if !state.can_capture() {
            let reason = match state.screen() {
                Screen::Camera => Rejection::CameraNotReady,
                screen => Rejection::InvalidTransition {
                    event: "capture_photo",
                    screen,
                },
            };
            log::warn!("[SESSION] capture_photo rejected: {}", reason);
            return Outcome::Rejected(reason);
        }
        match self.camera.snapshot() {
            Ok(image) => {
                let outcome = self.dispatch(Event::ImageCaptured(image));
                if outcome == Outcome::Applied {
                    self.camera.release();
                }
                outcome
            }
            Err(e) if self.camera.is_held() => {
                log::warn!("[CAMERA] Frame unusable, keeping stream open: {}", e);
                Outcome::Rejected(Rejection::FrameUnavailable)
            }
            Err(e) => {
                log::warn!("[CAMERA] Capture failed: {}", e);
                self.camera_failed(e)
            }
        }
    }

    /// Leave the Camera screen, releasing the device.
    pub fn cancel_camera(&self) -> Outcome {
        self.camera.release();
        self.dispatch(Event::CameraCancelled)
    }

    /// Run one analysis of the stored image. Resolves once the outcome has
    /// been applied, or discarded as stale.
    pub async fn analyze(&self) -> Outcome {
        let ticket = AnalysisTicket::new(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let job = match self.dispatch(Event::AnalyzeRequested(ticket)) {
            Outcome::StartAnalysis(job) => job,
            other => return other,
        };

        log::info!(
            "[SESSION] Analysis #{} started for image {}",
            ticket.id(),
            job.image.digest()
        );
        let event = match self.analyzer.analyze(&job.image).await {
            Ok(result) => Event::AnalysisSucceeded { ticket, result },
            Err(error) => {
                log::error!("[SESSION] Analysis #{} failed: {}", ticket.id(), error);
                Event::AnalysisFailed { ticket, error }
            }
        };
        self.dispatch(event)
    }

    /// Back to Welcome from anywhere. An in-flight analysis is left to
    /// finish and its result is discarded.
    pub fn reset(&self) -> Outcome {
        self.camera.release();
        self.dispatch(Event::Reset)
    }
}
