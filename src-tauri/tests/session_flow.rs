//! End-to-end session flows through `SessionController`, with a scripted
//! analyzer and a fake camera standing in for the service and the device.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use skinalyze_lib::capture::{CameraBackend, CameraStream, CaptureError, Facing, ImagePayload};
use skinalyze_lib::llm::{AnalysisError, AnalysisResult, Analyzer};
use skinalyze_lib::session::{
    CameraStatus, Outcome, Rejection, Screen, SessionController, SessionState,
    ANALYSIS_FAILED_MESSAGE, NO_IMAGE_MESSAGE,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ── Fakes ────────────────────────────────────────────────────────────

struct ScriptedAnalyzer {
    reply: Mutex<Result<AnalysisResult, AnalysisError>>,
    calls: AtomicUsize,
    /// When set, `analyze` signals `entered` and waits for `release`.
    gate: Option<(Notify, Notify)>,
}

impl ScriptedAnalyzer {
    fn replying(reply: Result<AnalysisResult, AnalysisError>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn gated(reply: Result<AnalysisResult, AnalysisError>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            gate: Some((Notify::new(), Notify::new())),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait_entered(&self) {
        if let Some((entered, _)) = &self.gate {
            entered.notified().await;
        }
    }

    fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.notify_one();
        }
    }
}

#[async_trait::async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, _image: &ImagePayload) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        self.reply.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct FakeCamera {
    active: Arc<AtomicUsize>,
    /// Frames still to be returned as errors.
    bad_frames: Arc<AtomicUsize>,
    live_on_open: bool,
    deny: bool,
}

impl FakeCamera {
    fn new(live_on_open: bool) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            bad_frames: Arc::new(AtomicUsize::new(0)),
            live_on_open,
            deny: false,
        }
    }

    fn denying() -> Self {
        Self {
            deny: true,
            ..Self::new(true)
        }
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct FakeStream {
    active: Arc<AtomicUsize>,
    bad_frames: Arc<AtomicUsize>,
    live: bool,
    stopped: bool,
}

impl CameraStream for FakeStream {
    fn is_live(&self) -> bool {
        self.live
    }

    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError> {
        let failing = self
            .bad_frames
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CaptureError::DeviceUnavailable("frame dropped".to_string()));
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            640,
            480,
            Rgb([180, 120, 100]),
        )))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl CameraBackend for FakeCamera {
    fn open(&self, _facing: Facing) -> Result<Box<dyn CameraStream>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            active: self.active.clone(),
            bad_frames: self.bad_frames.clone(),
            live: self.live_on_open,
            stopped: false,
        }))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn eczema() -> AnalysisResult {
    AnalysisResult {
        condition: "Possible Eczema".to_string(),
        description: "Dry, red patches with mild scaling.".to_string(),
        confidence: 0.71,
        is_normal: false,
        cautionary_note: "This is an AI-generated analysis and not a medical diagnosis."
            .to_string(),
    }
}

fn write_png(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 12, Rgb([200, 150, 120])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn controller(camera: FakeCamera, analyzer: Arc<ScriptedAnalyzer>) -> Arc<SessionController> {
    Arc::new(SessionController::new(Arc::new(camera), analyzer))
}

async fn uploaded(session: &SessionController) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(&dir, "arm.png");
    assert_eq!(session.upload_file(&path).await, Outcome::Applied);
    dir
}

// ── Upload and analysis ──────────────────────────────────────────────

#[tokio::test]
async fn upload_then_analyze_populates_result_exactly() {
    let analyzer = ScriptedAnalyzer::replying(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());
    let _dir = uploaded(&session).await;

    let state = session.state();
    assert_eq!(state.screen(), Screen::Preview);
    assert_eq!(state.image().unwrap().dimensions(), (16, 12));
    assert!(state.can_analyze());

    assert_eq!(session.analyze().await, Outcome::Applied);

    let state = session.state();
    assert!(!state.is_loading());
    assert_eq!(state.result(), Some(&eczema()));
    assert!(state.error().is_none());
    assert_eq!(analyzer.calls(), 1);

    let snapshot = session.snapshot();
    assert!(!snapshot.can_analyze);
    assert_eq!(snapshot.result.unwrap().confidence_percent(), 71);
}

#[tokio::test]
async fn service_failure_sets_generic_error_and_no_result() {
    let analyzer = ScriptedAnalyzer::replying(Err(AnalysisError::ServiceUnavailable(
        "service returned 500 Internal Server Error".to_string(),
    )));
    let session = controller(FakeCamera::new(true), analyzer);
    let _dir = uploaded(&session).await;

    session.analyze().await;

    let state = session.state();
    assert!(!state.is_loading());
    assert!(state.result().is_none());
    assert_eq!(state.error(), Some(ANALYSIS_FAILED_MESSAGE));
}

#[tokio::test]
async fn malformed_reply_looks_the_same_as_service_failure() {
    let analyzer = ScriptedAnalyzer::replying(Err(AnalysisError::MalformedResponse {
        reason: "missing field `confidence`".to_string(),
        raw: "{\"condition\":\"x\"}".to_string(),
    }));
    let session = controller(FakeCamera::new(true), analyzer);
    let _dir = uploaded(&session).await;

    session.analyze().await;

    let state = session.state();
    assert!(!state.is_loading());
    assert!(state.result().is_none());
    assert_eq!(state.error(), Some(ANALYSIS_FAILED_MESSAGE));
    assert!(!state.error().unwrap().contains("confidence"));
}

#[tokio::test]
async fn analyze_without_image_never_calls_the_service() {
    let analyzer = ScriptedAnalyzer::replying(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());

    let outcome = session.analyze().await;

    assert_eq!(outcome, Outcome::Rejected(Rejection::NoImage));
    assert_eq!(analyzer.calls(), 0);
    assert_eq!(session.state().error(), Some(NO_IMAGE_MESSAGE));
}

#[tokio::test]
async fn analyze_is_rejected_while_loading() {
    let analyzer = ScriptedAnalyzer::gated(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());
    let _dir = uploaded(&session).await;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.analyze().await }
    });
    analyzer.wait_entered().await;

    assert!(session.state().is_loading());
    assert!(!session.snapshot().can_analyze);
    assert_eq!(
        session.analyze().await,
        Outcome::Rejected(Rejection::AnalysisInFlight)
    );

    analyzer.release();
    assert_eq!(first.await.unwrap(), Outcome::Applied);
    assert_eq!(analyzer.calls(), 1);
}

#[tokio::test]
async fn analyze_is_rejected_once_a_result_exists() {
    let analyzer = ScriptedAnalyzer::replying(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());
    let _dir = uploaded(&session).await;

    session.analyze().await;
    assert_eq!(
        session.analyze().await,
        Outcome::Rejected(Rejection::AlreadyAnalyzed)
    );
    assert_eq!(analyzer.calls(), 1);
}

#[tokio::test]
async fn response_arriving_after_reset_is_discarded() {
    let analyzer = ScriptedAnalyzer::gated(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());
    let _dir = uploaded(&session).await;

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.analyze().await }
    });
    analyzer.wait_entered().await;

    session.reset();
    analyzer.release();

    assert_eq!(pending.await.unwrap(), Outcome::Stale);
    assert_eq!(session.state(), SessionState::new());
}

#[tokio::test]
async fn response_for_a_superseded_image_is_discarded() {
    let analyzer = ScriptedAnalyzer::gated(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());
    let dir = uploaded(&session).await;

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.analyze().await }
    });
    analyzer.wait_entered().await;

    // Start over and pick a new image before the old reply lands.
    session.reset();
    let second = write_png(&dir, "leg.png");
    session.upload_file(&second).await;
    analyzer.release();

    assert_eq!(pending.await.unwrap(), Outcome::Stale);
    let state = session.state();
    assert_eq!(state.screen(), Screen::Preview);
    assert!(state.result().is_none());
    assert!(state.can_analyze());
}

#[tokio::test]
async fn unreadable_upload_stays_on_welcome() {
    let session = controller(
        FakeCamera::new(true),
        ScriptedAnalyzer::replying(Ok(eczema())),
    );
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.png");
    std::fs::write(&path, b"definitely not a png").unwrap();

    session.upload_file(&path).await;

    let state = session.state();
    assert_eq!(state.screen(), Screen::Welcome);
    assert!(state.image().is_none());
    assert!(state.error().is_some());
}

#[tokio::test]
async fn reset_from_any_state_is_initial() {
    let session = controller(
        FakeCamera::new(true),
        ScriptedAnalyzer::replying(Ok(eczema())),
    );
    let _dir = uploaded(&session).await;
    session.analyze().await;

    session.reset();
    assert_eq!(session.state(), SessionState::new());
    session.reset();
    assert_eq!(session.state(), SessionState::new());
}

// ── Camera ───────────────────────────────────────────────────────────

#[test]
fn camera_capture_moves_to_preview_and_releases_device() {
    let camera = FakeCamera::new(true);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    assert_eq!(session.open_camera(Facing::Environment), Outcome::Applied);
    assert_eq!(camera.active(), 1);
    assert!(session.snapshot().can_capture);

    assert_eq!(session.capture_photo(), Outcome::Applied);

    let state = session.state();
    assert_eq!(state.screen(), Screen::Preview);
    assert_eq!(state.image().unwrap().dimensions(), (640, 480));
    assert_eq!(camera.active(), 0);
    assert!(!session.camera_held());
}

#[test]
fn capture_waits_for_the_stream_to_be_live() {
    let camera = FakeCamera::new(false);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    session.open_camera(Facing::Environment);
    assert_eq!(session.state().camera(), &CameraStatus::Starting);
    assert_eq!(
        session.capture_photo(),
        Outcome::Rejected(Rejection::CameraNotReady)
    );
    assert_eq!(session.state().screen(), Screen::Camera);

    session.camera_ready();
    assert_eq!(session.capture_photo(), Outcome::Applied);
    assert_eq!(camera.active(), 0);
}

#[test]
fn camera_cancel_releases_device_and_restores_welcome() {
    let camera = FakeCamera::new(true);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    session.open_camera(Facing::Environment);
    assert!(session.camera_held());

    assert_eq!(session.cancel_camera(), Outcome::Applied);
    assert_eq!(camera.active(), 0);
    assert!(!session.camera_held());
    assert_eq!(session.state(), SessionState::new());
}

#[test]
fn permission_denied_is_shown_on_camera_screen() {
    let session = controller(
        FakeCamera::denying(),
        ScriptedAnalyzer::replying(Ok(eczema())),
    );

    session.open_camera(Facing::Environment);

    let state = session.state();
    assert_eq!(state.screen(), Screen::Camera);
    assert!(matches!(state.camera(), CameraStatus::Failed(msg) if msg.contains("permissions")));
    assert!(!state.can_capture());
    assert!(state.error().is_none());

    session.cancel_camera();
    assert_eq!(session.open_camera(Facing::Environment), Outcome::Applied);
}

#[test]
fn reset_on_camera_screen_releases_device() {
    let camera = FakeCamera::new(true);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    session.open_camera(Facing::User);
    session.reset();

    assert_eq!(camera.active(), 0);
    assert_eq!(session.state(), SessionState::new());
}

#[test]
fn capture_outside_camera_screen_is_invalid() {
    let session = controller(
        FakeCamera::new(true),
        ScriptedAnalyzer::replying(Ok(eczema())),
    );
    assert!(matches!(
        session.capture_photo(),
        Outcome::Rejected(Rejection::InvalidTransition {
            screen: Screen::Welcome,
            ..
        })
    ));
}

// ── Leaving the Camera screen ────────────────────────────────────────

#[tokio::test]
async fn upload_on_camera_screen_is_refused_and_camera_stays_owned() {
    let camera = FakeCamera::new(true);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(&dir, "arm.png");

    session.open_camera(Facing::Environment);
    let outcome = session.upload_file(&path).await;

    assert_eq!(
        outcome,
        Outcome::Rejected(Rejection::InvalidTransition {
            event: "image_uploaded",
            screen: Screen::Camera,
        })
    );
    let state = session.state();
    assert_eq!(state.screen(), Screen::Camera);
    assert!(state.image().is_none());
    assert!(state.can_capture());
    assert_eq!(camera.active(), 1);

    session.cancel_camera();
    assert_eq!(camera.active(), 0);
}

#[test]
fn camera_failure_after_open_releases_device() {
    let camera = FakeCamera::new(true);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    session.open_camera(Facing::Environment);
    session.camera_failed(CaptureError::DeviceUnavailable("unplugged".to_string()));

    assert_eq!(camera.active(), 0);
    assert!(!session.camera_held());
    assert!(matches!(session.state().camera(), CameraStatus::Failed(_)));
}

fn exit_by_capture(session: &SessionController) {
    session.capture_photo();
}

fn exit_by_cancel(session: &SessionController) {
    session.cancel_camera();
}

fn exit_by_reset(session: &SessionController) {
    session.reset();
}

fn exit_by_failure(session: &SessionController) {
    session.camera_failed(CaptureError::PermissionDenied);
}

#[test]
fn every_exit_from_camera_releases_device() {
    let exits: [(&str, fn(&SessionController)); 4] = [
        ("capture", exit_by_capture),
        ("cancel", exit_by_cancel),
        ("reset", exit_by_reset),
        ("failure", exit_by_failure),
    ];

    for (label, exit) in exits {
        let camera = FakeCamera::new(true);
        let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));
        session.open_camera(Facing::Environment);
        assert_eq!(camera.active(), 1, "{}: device not opened", label);

        exit(&*session);

        assert_eq!(camera.active(), 0, "{}: device still running", label);
        assert!(!session.camera_held(), "{}: lease still held", label);
    }
}

#[test]
fn bad_frame_keeps_stream_open_for_retry() {
    let camera = FakeCamera::new(true);
    camera.bad_frames.store(1, Ordering::SeqCst);
    let session = controller(camera.clone(), ScriptedAnalyzer::replying(Ok(eczema())));

    session.open_camera(Facing::Environment);
    assert_eq!(
        session.capture_photo(),
        Outcome::Rejected(Rejection::FrameUnavailable)
    );
    assert_eq!(camera.active(), 1);
    assert!(session.snapshot().can_capture);

    assert_eq!(session.capture_photo(), Outcome::Applied);
    assert_eq!(session.state().screen(), Screen::Preview);
    assert_eq!(camera.active(), 0);
}

#[tokio::test]
async fn analyze_on_camera_screen_does_not_touch_error() {
    let analyzer = ScriptedAnalyzer::replying(Ok(eczema()));
    let session = controller(FakeCamera::new(true), analyzer.clone());

    session.open_camera(Facing::Environment);
    let outcome = session.analyze().await;

    assert!(matches!(
        outcome,
        Outcome::Rejected(Rejection::InvalidTransition {
            screen: Screen::Camera,
            ..
        })
    ));
    assert!(session.state().error().is_none());
    assert_eq!(analyzer.calls(), 0);
}
