//! Session state and its transition function.
//!
//! Every mutation of the session goes through `transition`, a pure
//! `(state, event) -> state` function. Side effects (camera, network) are
//! performed by the controller; the only effect requested from here is
//! `Outcome::StartAnalysis`.

use crate::capture::{CaptureError, ImagePayload};
use crate::llm::{AnalysisError, AnalysisResult};
use serde::Serialize;

/// Shown when analyze is requested without an image.
pub const NO_IMAGE_MESSAGE: &str = "No image data to analyze.";

/// Shown for every analysis failure. The cause goes to the log only.
pub const ANALYSIS_FAILED_MESSAGE: &str = "An error occurred during analysis. The AI model may be unable to process this image. Please try a different one.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    #[default]
    Welcome,
    Camera,
    Preview,
}

/// Camera lifecycle as seen by the Camera screen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum CameraStatus {
    #[default]
    Idle,
    Starting,
    Live,
    /// User-facing failure message.
    Failed(String),
}

/// Identity of one analysis request. A result is only applied when its
/// ticket matches the request the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisTicket(u64);

impl AnalysisTicket {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// The whole session. Fields are private: only `transition` writes them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    screen: Screen,
    image: Option<ImagePayload>,
    result: Option<AnalysisResult>,
    error: Option<String>,
    camera: CameraStatus,
    in_flight: Option<AnalysisTicket>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn camera(&self) -> &CameraStatus {
        &self.camera
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<AnalysisTicket> {
        self.in_flight
    }

    /// Whether the analyze action is enabled.
    pub fn can_analyze(&self) -> bool {
        self.screen == Screen::Preview
            && self.image.is_some()
            && self.in_flight.is_none()
            && self.result.is_none()
    }

    /// Whether the capture action is enabled.
    pub fn can_capture(&self) -> bool {
        self.screen == Screen::Camera && self.camera == CameraStatus::Live
    }

    /// Structural invariants that must hold after every transition.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        if self.result.is_some() && self.image.is_none() {
            return Err("result without image");
        }
        if self.in_flight.is_some() && (self.result.is_some() || self.error.is_some()) {
            return Err("loading with a resolved outcome");
        }
        if self.result.is_some() && self.error.is_some() {
            return Err("both result and error");
        }
        if self.image.is_some() != (self.screen == Screen::Preview) {
            return Err("image present outside Preview");
        }
        if self.screen != Screen::Camera && self.camera != CameraStatus::Idle {
            return Err("camera active outside Camera screen");
        }
        Ok(())
    }
}

/// Render-ready view of the session. The presentation layer reads nothing
/// else.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub screen: Screen,
    pub image_data_url: Option<String>,
    pub result: Option<AnalysisResult>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub camera: CameraStatus,
    pub can_analyze: bool,
    pub can_capture: bool,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            screen: state.screen,
            image_data_url: state.image.as_ref().map(ImagePayload::to_data_url),
            result: state.result.clone(),
            is_loading: state.is_loading(),
            error: state.error.clone(),
            camera: state.camera.clone(),
            can_analyze: state.can_analyze(),
            can_capture: state.can_capture(),
        }
    }
}

/// Everything that can happen to a session.
#[derive(Debug, Clone)]
pub enum Event {
    /// A file was read on the Welcome screen.
    ImageUploaded(ImagePayload),
    /// A frame was snapshotted from the live camera.
    ImageCaptured(ImagePayload),
    UploadFailed(CaptureError),
    CameraRequested,
    CameraReady,
    CameraFailed(CaptureError),
    CameraCancelled,
    AnalyzeRequested(AnalysisTicket),
    AnalysisSucceeded {
        ticket: AnalysisTicket,
        result: AnalysisResult,
    },
    AnalysisFailed {
        ticket: AnalysisTicket,
        error: AnalysisError,
    },
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ImageUploaded(_) => "image_uploaded",
            Event::ImageCaptured(_) => "image_captured",
            Event::UploadFailed(_) => "upload_failed",
            Event::CameraRequested => "camera_requested",
            Event::CameraReady => "camera_ready",
            Event::CameraFailed(_) => "camera_failed",
            Event::CameraCancelled => "camera_cancelled",
            Event::AnalyzeRequested(_) => "analyze_requested",
            Event::AnalysisSucceeded { .. } => "analysis_succeeded",
            Event::AnalysisFailed { .. } => "analysis_failed",
            Event::Reset => "reset",
        }
    }
}

/// Why an event was refused. The state is left untouched, except for
/// `NoImage`, which is reported through the session error. `FrameUnavailable`
/// keeps the camera open so the user can try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no image to analyze")]
    NoImage,
    #[error("an analysis is already in flight")]
    AnalysisInFlight,
    #[error("this image has already been analyzed")]
    AlreadyAnalyzed,
    #[error("camera is not live")]
    CameraNotReady,
    #[error("no usable camera frame")]
    FrameUnavailable,
    #[error("{event} is not valid on the {screen:?} screen")]
    InvalidTransition { event: &'static str, screen: Screen },
}

/// Work the controller must start after a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub ticket: AnalysisTicket,
    pub image: ImagePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    StartAnalysis(AnalysisJob),
    Rejected(Rejection),
    /// A late camera or analysis report for something no longer current.
    Stale,
}

/// Result of one transition.
#[derive(Debug)]
pub struct Step {
    pub state: SessionState,
    pub outcome: Outcome,
}

impl Step {
    fn applied(state: SessionState) -> Self {
        Self {
            state,
            outcome: Outcome::Applied,
        }
    }

    fn unchanged(state: SessionState, outcome: Outcome) -> Self {
        Self { state, outcome }
    }

    fn rejected(state: SessionState, rejection: Rejection) -> Self {
        Self::unchanged(state, Outcome::Rejected(rejection))
    }
}

/// Apply one event to the session.
pub fn transition(state: SessionState, event: Event) -> Step {
    let step = apply(state, event);
    debug_assert!(
        step.state.check_invariants().is_ok(),
        "invariant violated: {:?}",
        step.state.check_invariants()
    );
    step
}

fn apply(state: SessionState, event: Event) -> Step {
    let screen = state.screen;
    let name = event.name();
    let invalid = |state| Step::rejected(state, Rejection::InvalidTransition { event: name, screen });

    match event {
        Event::Reset => Step::applied(SessionState::default()),

        Event::ImageUploaded(image) => match screen {
            Screen::Welcome => Step::applied(SessionState {
                screen: Screen::Preview,
                image: Some(image),
                ..SessionState::default()
            }),
            _ => invalid(state),
        },

        Event::ImageCaptured(image) => match screen {
            Screen::Camera if state.camera == CameraStatus::Live => Step::applied(SessionState {
                screen: Screen::Preview,
                image: Some(image),
                ..SessionState::default()
            }),
            Screen::Camera => Step::rejected(state, Rejection::CameraNotReady),
            _ => invalid(state),
        },

        Event::UploadFailed(err) => match screen {
            Screen::Welcome => Step::applied(SessionState {
                error: Some(err.user_message().to_string()),
                ..state
            }),
            _ => invalid(state),
        },

        // A capture error raised on Welcome is not carried into the camera.
        Event::CameraRequested => match screen {
            Screen::Welcome => Step::applied(SessionState {
                screen: Screen::Camera,
                camera: CameraStatus::Starting,
                error: None,
                ..state
            }),
            _ => invalid(state),
        },

        Event::CameraReady => {
            let opening = matches!(state.camera, CameraStatus::Starting | CameraStatus::Live);
            match screen {
                Screen::Camera if opening => Step::applied(SessionState {
                    camera: CameraStatus::Live,
                    ..state
                }),
                Screen::Camera => invalid(state),
                _ => Step::unchanged(state, Outcome::Stale),
            }
        }

        Event::CameraFailed(err) => match screen {
            Screen::Camera => Step::applied(SessionState {
                camera: CameraStatus::Failed(err.user_message().to_string()),
                ..state
            }),
            _ => Step::unchanged(state, Outcome::Stale),
        },

        Event::CameraCancelled => match screen {
            Screen::Camera => Step::applied(SessionState {
                screen: Screen::Welcome,
                camera: CameraStatus::Idle,
                ..state
            }),
            _ => invalid(state),
        },

        // Camera errors live in `camera`, never in `error`.
        Event::AnalyzeRequested(_) if screen == Screen::Camera => invalid(state),

        Event::AnalyzeRequested(ticket) => {
            let Some(image) = state.image.clone() else {
                return Step::unchanged(
                    SessionState {
                        error: Some(NO_IMAGE_MESSAGE.to_string()),
                        ..state
                    },
                    Outcome::Rejected(Rejection::NoImage),
                );
            };
            if state.in_flight.is_some() {
                return Step::rejected(state, Rejection::AnalysisInFlight);
            }
            if state.result.is_some() {
                return Step::rejected(state, Rejection::AlreadyAnalyzed);
            }
            Step::unchanged(
                SessionState {
                    in_flight: Some(ticket),
                    error: None,
                    result: None,
                    ..state
                },
                Outcome::StartAnalysis(AnalysisJob { ticket, image }),
            )
        }

        Event::AnalysisSucceeded { ticket, result } => {
            if state.in_flight != Some(ticket) {
                return Step::unchanged(state, Outcome::Stale);
            }
            Step::applied(SessionState {
                in_flight: None,
                result: Some(result),
                error: None,
                ..state
            })
        }

        Event::AnalysisFailed { ticket, .. } => {
            if state.in_flight != Some(ticket) {
                return Step::unchanged(state, Outcome::Stale);
            }
            Step::applied(SessionState {
                in_flight: None,
                result: None,
                error: Some(ANALYSIS_FAILED_MESSAGE.to_string()),
                ..state
            })
        }
    }
}
