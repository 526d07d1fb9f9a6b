//! Skinalyze — photo of a skin area in, cautious AI assessment out.
//!
//! Domains:
//!   - capture/ — file upload, camera leases, `ImagePayload`
//!   - llm/     — analysis client (Gemini), prompts, result validation
//!   - session/ — screen state machine and its async controller
//!   - config   — API key, model and endpoint resolution
//!
//! The desktop shell (`run`, `commands`) is behind the `desktop` feature.

pub mod capture;
pub mod config;
pub mod llm;
pub mod session;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use crate::capture::webview::WebviewCamera;
    use crate::config::{self, AnalysisConfig};
    use crate::llm::GeminiClient;
    use crate::session::SessionController;
    use crate::commands;
    use std::sync::Arc;
    use tauri::Manager;

    /// Entry point — called by Tauri runtime.
    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // CARGO_MANIFEST_DIR is src-tauri/; .env files live one level up.
        let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let project_root = manifest_dir.parent().unwrap_or(manifest_dir);

        env_logger::init();
        config::load_env_files(project_root);

        let client = Arc::new(GeminiClient::new(AnalysisConfig::from_env()));

        tauri::Builder::default()
            .plugin(tauri_plugin_dialog::init())
            .manage(client.clone())
            .invoke_handler(tauri::generate_handler![
                commands::get_session,
                commands::pick_image,
                commands::open_camera,
                commands::camera_started,
                commands::camera_failed,
                commands::capture_photo,
                commands::cancel_camera,
                commands::analyze_image,
                commands::reset_session,
                commands::save_api_key,
            ])
            .setup(move |app| {
                log::info!("[STARTUP] Skinalyze starting up (model {})", client.model());

                let camera = Arc::new(WebviewCamera::new(app.handle().clone()));
                let session = SessionController::new(camera.clone(), client.clone());
                app.manage(camera);
                app.manage(session);

                log::info!("[STARTUP] Session ready");
                Ok(())
            })
            .run(tauri::generate_context!())
            .expect("Error running Skinalyze");
    }
}
