//! Engine configuration and user settings storage

use crate::error::{AutofillError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the settings file location
pub const CONFIG_PATH_ENV: &str = "AUTOFILL_CONFIG";

const CONFIG_DIR_NAME: &str = "accessibility-autofill";
const CONFIG_FILE_NAME: &str = "config.json";

/// User-facing autofill policy switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutofillSettings {
    #[serde(default = "default_autofill_enabled")]
    pub autofill_enabled: bool,
    /// Fill when a password field gains focus instead of on content changes
    #[serde(default)]
    pub autofill_password_field: bool,
    /// Keep the autofill notification posted on every fillable screen
    #[serde(default)]
    pub autofill_persist_notification: bool,
}

fn default_autofill_enabled() -> bool {
    true
}

impl Default for AutofillSettings {
    fn default() -> Self {
        Self {
            autofill_enabled: true,
            autofill_password_field: false,
            autofill_persist_notification: false,
        }
    }
}

/// Source of the current settings, queried once per event
pub trait SettingsProvider {
    fn settings(&self) -> AutofillSettings;
}

impl SettingsProvider for AutofillSettings {
    fn settings(&self) -> AutofillSettings {
        *self
    }
}

/// Settings backed by a JSON file, re-read on every query so edits made by the
/// settings screen take effect on the next event.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettings {
    fn settings(&self) -> AutofillSettings {
        match load_settings_from(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to read settings, using defaults: {}", e);
                AutofillSettings::default()
            }
        }
    }
}

/// Fixed engine constants. Hosts embedding the engine for another app can
/// override any of them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The engine's own application id
    pub own_app_id: String,
    /// Element ids in this namespace belong to the system UI overlay
    pub system_ui_namespace: String,
    /// Screens showing the vault's own web app are never filled
    pub vault_web_domain: String,
    /// Scheme used for native app URIs
    pub app_scheme: String,
    pub notification_id: i32,
    pub channel_id: String,
    pub launcher_ttl: Duration,
    /// Minimum age of a posted notification before a cancel takes effect
    pub cancel_throttle: Duration,
    /// Cancel grace while the self-referential app URI is still on screen
    pub self_scheme_grace: Duration,
    /// Delay before an unused pending credential is dropped
    pub pending_clear_delay: Duration,
    pub max_depth: usize,
    pub max_children: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            own_app_id: "com.x8bit.bitwarden".to_string(),
            system_ui_namespace: "com.android.systemui".to_string(),
            vault_web_domain: "vault.bitwarden.com".to_string(),
            app_scheme: "app://".to_string(),
            notification_id: 34573,
            channel_id: "bitwarden_autofill_service".to_string(),
            launcher_ttl: Duration::from_secs(60 * 60),
            cancel_throttle: Duration::from_millis(250),
            self_scheme_grace: Duration::from_secs(30),
            pending_clear_delay: Duration::from_secs(1),
            max_depth: 50,
            max_children: 100,
        }
    }
}

/// Resolve the settings file location
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map_err(|_| AutofillError::ConfigError("No config directory found".to_string()))?;

    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn load_settings() -> Result<AutofillSettings> {
    load_settings_from(&config_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<AutofillSettings> {
    if !path.exists() {
        return Ok(AutofillSettings::default());
    }

    let content = fs::read_to_string(path)?;

    serde_json::from_str(&content).map_err(|e| AutofillError::ConfigError(e.to_string()))
}

pub fn save_settings_to(path: &Path, settings: &AutofillSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AutofillError::ConfigError(e.to_string()))?;

    fs::write(path, content)?;
    Ok(())
}
