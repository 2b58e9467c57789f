use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::ai::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::ai::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use crate::ai::{RetryMode, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_mode: RetryMode,
    pub request_timeout_secs: u64,
    /// V4L2 device used for the front (`user`) facing mode.
    pub front_camera: String,
    /// V4L2 device used for the back (`environment`) facing mode.
    /// Laptops typically expose a single sensor, so both default to video0.
    pub back_camera: String,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub jpeg_quality: u8,
    pub ffmpeg_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            retry_mode: RetryMode::Always,
            request_timeout_secs: 60,
            front_camera: "/dev/video0".into(),
            back_camera: "/dev/video0".into(),
            ideal_width: 640,
            ideal_height: 480,
            jpeg_quality: 90,
            ffmpeg_path: "ffmpeg".into(),
        }
    }
}

impl Settings {
    /// Read a TOML settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Apply `AROGYA_API_KEY` (or `GOOGLE_API_KEY`), `AROGYA_MODEL` and
    /// `AROGYA_BASE_URL` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::with_env_overrides`] with an injectable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("AROGYA_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.api_key = key;
        }
        if let Some(model) = non_empty("AROGYA_MODEL") {
            self.model = model;
        }
        if let Some(url) = non_empty("AROGYA_BASE_URL") {
            self.base_url = url;
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            mode: self.retry_mode,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(feature = "desktop")]
impl Settings {
    /// `settings.toml` inside the app config directory.
    pub fn app_config_path(app: &tauri::AppHandle) -> Result<std::path::PathBuf, String> {
        use tauri::Manager;
        let dir = app.path().app_config_dir().map_err(|e| e.to_string())?;
        Ok(dir.join("settings.toml"))
    }

    /// Load settings from the app config directory, then apply env overrides.
    pub fn load_from_app(app: &tauri::AppHandle) -> Result<Self, String> {
        let path = Self::app_config_path(app)?;
        let settings = Settings::load(&path).map_err(|e| e.to_string())?;
        Ok(settings.with_env_overrides())
    }
}
