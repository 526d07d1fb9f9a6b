//! Service configuration — credentials, model and endpoint.
//!
//! Resolution order for the API key:
//! 1. `GEMINI_API_KEY` env var
//! 2. `API_KEY` env var
//! 3. OS keychain entry (service "skinalyze", user "gemini")
//!
//! Env vars may come from `.env.local` / `.env` in the project root or from
//! `<config_dir>/skinalyze/.env`, loaded once at startup.

use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

const KEYRING_SERVICE: &str = "skinalyze";
const KEYRING_USER: &str = "gemini";
const KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API key is empty")]
    EmptyKey,
    #[error("keychain error: {0}")]
    Keychain(#[from] keyring::Error),
}

/// Everything the analysis client needs to reach the service.
#[derive(Clone)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Resolve configuration from the environment and the OS keychain.
    ///
    /// A missing key is not fatal here: it is logged, and every analysis
    /// then fails as `ServiceUnavailable`.
    pub fn from_env() -> Self {
        let api_key = first_non_empty(KEY_VARS.iter().map(|var| std::env::var(var).ok()))
            .or_else(api_key_from_keychain);
        if api_key.is_none() {
            log::warn!("[CONFIG] No GEMINI_API_KEY / API_KEY set and none in keychain");
        }

        let model = first_non_empty([std::env::var("SKINALYZE_MODEL").ok()])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base = first_non_empty([std::env::var("SKINALYZE_API_BASE").ok()])
            .map(|base| normalize_api_base(&base))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        log::info!("[CONFIG] Model: {}, endpoint: {}", model, api_base);
        Self {
            api_key,
            model,
            api_base,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = normalize_api_base(base);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Load `.env.local` (or `.env`) from the project root, then the per-user
/// `.env`. Existing env vars are never overridden. Returns the files loaded.
pub fn load_env_files(project_root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(local) = [".env.local", ".env"]
        .iter()
        .map(|name| project_root.join(name))
        .find(|path| path.exists())
    {
        candidates.push(local);
    }
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(KEYRING_SERVICE).join(".env"));
    }

    let mut loaded = Vec::new();
    for path in candidates {
        if !path.exists() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => {
                log::info!("[STARTUP] Loaded {}", path.display());
                loaded.push(path);
            }
            Err(e) => log::warn!("[STARTUP] Failed to load {}: {}", path.display(), e),
        }
    }
    loaded
}

/// Store an API key in the OS keychain.
pub fn save_api_key(key: &str) -> Result<(), ConfigError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::EmptyKey);
    }
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(key)?;
    log::info!("[CONFIG] Saved API key to OS keychain");
    Ok(())
}

fn api_key_from_keychain() -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
    match entry.get_password() {
        Ok(key) if !key.trim().is_empty() => {
            log::info!("[CONFIG] Loaded API key from OS keychain");
            Some(key.trim().to_string())
        }
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("[CONFIG] Keychain lookup failed: {}", e);
            None
        }
    }
}

fn first_non_empty(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn normalize_api_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
