//! Settings types. All structs deserialize with `camelCase` keys and fall
//! back to their defaults field by field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object (`~/.mirai/settings.json`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiraiSettings {
    pub api: ApiSettings,
    pub draft: DraftSettings,
    pub logging: LoggingSettings,
}

/// Backend connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Origin serving `/api/...`, without a trailing path.
    pub base_url: String,
    /// TCP connect timeout in milliseconds. The stream itself has no overall
    /// deadline.
    pub connect_timeout_ms: u64,
    /// Model alias forwarded to the backend; the backend default applies when
    /// unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_ms: 10_000,
            model: None,
        }
    }
}

/// Local draft cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftSettings {
    pub enabled: bool,
    /// SQLite file, relative to `~/.mirai` unless absolute.
    pub db_path: String,
}

impl Default for DraftSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "draft.db".to_string(),
        }
    }
}

impl DraftSettings {
    pub fn resolve_db_path(&self, home: &Path) -> PathBuf {
        let path = Path::new(&self.db_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            home.join(path)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`error`..`trace`). `RUST_LOG` still wins.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl MiraiSettings {
    /// Reject values no client could work with.
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "api.baseUrl must start with http:// or https://, got {url:?}"
            )));
        }
        if self.api.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "api.connectTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
