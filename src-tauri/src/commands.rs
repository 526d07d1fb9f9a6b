//! Tauri commands for the webview.
//!
//! Thin wrappers: each one forwards to `SessionController` and returns the
//! fresh `SessionSnapshot` for the webview to render. Refused actions come
//! back as `Err(String)`, except a missing image, which is shown through
//! the session error.

use crate::capture::webview::{self, WebviewCamera};
use crate::capture::{Facing, ACCEPTED_EXTENSIONS};
use crate::config;
use crate::llm::GeminiClient;
use crate::session::{Outcome, Rejection, SessionController, SessionSnapshot};
use std::sync::Arc;
use tauri::State;
use tauri_plugin_dialog::DialogExt;

fn respond(
    session: &SessionController,
    outcome: Outcome,
) -> Result<SessionSnapshot, String> {
    match outcome {
        Outcome::Rejected(Rejection::NoImage) => Ok(session.snapshot()),
        Outcome::Rejected(reason) => Err(reason.to_string()),
        _ => Ok(session.snapshot()),
    }
}

/// Tauri command: current session for rendering.
#[tauri::command]
pub fn get_session(session: State<'_, SessionController>) -> SessionSnapshot {
    session.snapshot()
}

/// Tauri command: native file picker, then upload the chosen image.
/// Cancelling the dialog leaves the session as it was.
#[tauri::command]
pub async fn pick_image(
    app: tauri::AppHandle,
    session: State<'_, SessionController>,
) -> Result<SessionSnapshot, String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut dialog = app
        .dialog()
        .file()
        .set_title("Choose a photo")
        .add_filter("Images", ACCEPTED_EXTENSIONS);
    if let Some(dir) = dirs::picture_dir() {
        dialog = dialog.set_directory(dir);
    }
    dialog.pick_file(move |file| {
        let _ = tx.send(file);
    });

    let Some(file) = rx.await.map_err(|e| e.to_string())? else {
        log::info!("[CAPTURE] File dialog cancelled");
        return Ok(session.snapshot());
    };
    let path = file.into_path().map_err(|e| e.to_string())?;
    let outcome = session.upload_file(&path).await;
    respond(&session, outcome)
}

/// Tauri command: switch to the Camera screen and request the device.
#[tauri::command]
pub fn open_camera(
    session: State<'_, SessionController>,
    facing: Option<String>,
) -> Result<SessionSnapshot, String> {
    let facing = match facing.as_deref() {
        Some("user") => Facing::User,
        _ => Facing::Environment,
    };
    let outcome = session.open_camera(facing);
    respond(&session, outcome)
}

/// Tauri command: the webview's video element started playing.
#[tauri::command]
pub fn camera_started(
    session: State<'_, SessionController>,
    camera: State<'_, Arc<WebviewCamera>>,
) -> Result<SessionSnapshot, String> {
    camera.mark_live();
    let outcome = session.camera_ready();
    respond(&session, outcome)
}

/// Tauri command: `getUserMedia` rejected (`name` is the DOMException name).
#[tauri::command]
pub fn camera_failed(
    session: State<'_, SessionController>,
    name: String,
    message: String,
) -> Result<SessionSnapshot, String> {
    let outcome = session.camera_failed(webview::media_error(&name, &message));
    respond(&session, outcome)
}

/// Tauri command: take the frame drawn from the live video and preview it.
#[tauri::command]
pub fn capture_photo(
    session: State<'_, SessionController>,
    camera: State<'_, Arc<WebviewCamera>>,
    frame: String,
) -> Result<SessionSnapshot, String> {
    // A bad frame is dropped on its own; the stream stays up for a retry.
    if let Err(e) = camera.push_frame(&frame) {
        log::warn!("[CAMERA] Rejected frame from webview: {}", e);
        return respond(&session, Outcome::Rejected(Rejection::FrameUnavailable));
    }
    let outcome = session.capture_photo();
    respond(&session, outcome)
}

/// Tauri command: leave the Camera screen.
#[tauri::command]
pub fn cancel_camera(session: State<'_, SessionController>) -> Result<SessionSnapshot, String> {
    let outcome = session.cancel_camera();
    respond(&session, outcome)
}

/// Tauri command: analyze the previewed image. Resolves after the result
/// (or the generic error) is stored.
#[tauri::command]
pub async fn analyze_image(
    session: State<'_, SessionController>,
) -> Result<SessionSnapshot, String> {
    let outcome = session.analyze().await;
    respond(&session, outcome)
}

/// Tauri command: back to Welcome.
#[tauri::command]
pub fn reset_session(session: State<'_, SessionController>) -> SessionSnapshot {
    session.reset();
    session.snapshot()
}

/// Tauri command: store the API key in the OS keychain and use it now.
#[tauri::command]
pub fn save_api_key(client: State<'_, Arc<GeminiClient>>, key: String) -> Result<(), String> {
    config::save_api_key(&key).map_err(|e| e.to_string())?;
    client.set_api_key(key.trim());
    Ok(())
}
