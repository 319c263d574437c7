use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::provider::ProviderId;
use crate::timefmt::TimeFormat;

/// TTL used when auto-refresh is switched off.
const FALLBACK_TTL_MINUTES: u64 = 15;

/// User settings consumed (read-only) by the aggregation core.
///
/// Example TOML:
/// ```toml
/// source = "qweather"
/// language = "en"
/// auto_refresh_interval = 30
/// time_format = "24h"
///
/// [api_keys]
/// qweather = "..."
/// openweather = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default provider id, e.g. "openweather" or "qweather".
    pub source: Option<String>,

    /// Endpoint for the "custom" provider; selecting it without a URL is a
    /// configuration error.
    pub custom_url: Option<String>,

    /// Provider id -> API key.
    pub api_keys: HashMap<String, String>,

    /// Custom QWeather deployment host, e.g. "devapi.qweather.com" or a
    /// mirror. Protocol prefixes and trailing slashes are tolerated.
    pub qweather_host: Option<String>,

    /// Minutes between automatic refreshes; 0 disables auto-refresh. Doubles
    /// as the cache TTL.
    pub auto_refresh_interval: u64,

    pub time_format: TimeFormat,

    /// Language code passed to providers ("en", "zh", ...).
    pub language: String,

    /// Upper bound on every provider HTTP call.
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            custom_url: None,
            api_keys: HashMap::new(),
            qweather_host: None,
            auto_refresh_interval: 0,
            time_format: TimeFormat::H24,
            language: "en".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// The configured default provider, strongly typed.
    pub fn default_source(&self) -> Result<Option<ProviderId>> {
        self.source.as_deref().map(ProviderId::try_from).transpose()
    }

    pub fn api_key(&self, id: ProviderId) -> Option<&str> {
        self.api_keys.get(id.as_str()).map(String::as_str)
    }

    pub fn set_api_key(&mut self, id: ProviderId, key: String) {
        self.api_keys.insert(id.as_str().to_string(), key);
        if self.source.is_none() {
            self.source = Some(id.to_string());
        }
    }

    /// Cache TTL derived from the auto-refresh interval, with a 15-minute
    /// fallback when auto-refresh is off.
    pub fn cache_ttl(&self) -> Duration {
        let minutes = if self.auto_refresh_interval > 0 {
            self.auto_refresh_interval
        } else {
            FALLBACK_TTL_MINUTES
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Load settings from disk, or return defaults if no file exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::settings_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    pub fn settings_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("settings.toml"))
    }
}
