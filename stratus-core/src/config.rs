use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::provider::ProviderId;

fn default_language() -> String {
    "en".to_string()
}

fn default_one_call_version() -> String {
    "2.5".to_string()
}

/// OpenWeather credentials and options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWeatherConfig {
    pub api_key: String,
    /// One Call API version, "2.5" or "3.0".
    #[serde(default = "default_one_call_version")]
    pub one_call_version: String,
}

/// Meteo-France credentials. Either a pre-provisioned `token` or a
/// `jwt_key` to sign one locally; `atmo_aura_key` additionally unlocks
/// the Atmo AuRA air-quality requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeteoFranceConfig {
    pub token: Option<String>,
    pub jwt_key: Option<String>,
    pub atmo_aura_key: Option<String>,
}

/// Per-provider credential tables.
///
/// Example TOML:
/// ```toml
/// [providers.openweather]
/// api_key = "..."
/// one_call_version = "3.0"
///
/// [providers.meteofrance]
/// jwt_key = "..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Providers {
    pub openweather: Option<OpenWeatherConfig>,
    pub meteofrance: Option<MeteoFranceConfig>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Optional default provider id, e.g. "openweather" or "meteofrance".
    pub default_provider: Option<String>,

    /// BCP 47-ish language code forwarded to the providers.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub providers: Providers,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: None,
            language: default_language(),
            providers: Providers::default(),
        }
    }
}

impl Settings {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow!(
                "No default provider configured.\n\
                 Hint: run `stratus configure <provider>` (e.g. `stratus configure openweather`) first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    pub fn open_weather(&self) -> Option<&OpenWeatherConfig> {
        self.providers.openweather.as_ref()
    }

    pub fn meteo_france(&self) -> Option<&MeteoFranceConfig> {
        self.providers.meteofrance.as_ref()
    }

    /// Set/replace the OpenWeather key and make it the default provider
    /// if none is set yet.
    pub fn upsert_open_weather(&mut self, api_key: String, one_call_version: Option<String>) {
        self.providers.openweather = Some(OpenWeatherConfig {
            api_key,
            one_call_version: one_call_version.unwrap_or_else(default_one_call_version),
        });
        if self.default_provider.is_none() {
            self.set_default_provider(ProviderId::OpenWeather);
        }
    }

    /// Set/replace the Meteo-France credentials and make it the default
    /// provider if none is set yet.
    pub fn upsert_meteo_france(&mut self, config: MeteoFranceConfig) {
        self.providers.meteofrance = Some(config);
        if self.default_provider.is_none() {
            self.set_default_provider(ProviderId::MeteoFrance);
        }
    }

    /// Whether credentials exist for a provider. Open-Meteo never needs any.
    pub fn is_provider_configured(&self, id: ProviderId) -> bool {
        match id {
            ProviderId::OpenWeather => {
                self.open_weather().is_some_and(|c| !c.api_key.is_empty())
            }
            ProviderId::MeteoFrance => self.meteo_france().is_some_and(|c| {
                c.token.as_deref().is_some_and(|t| !t.is_empty())
                    || c.jwt_key.as_deref().is_some_and(|k| !k.is_empty())
            }),
            ProviderId::OpenMeteo => true,
        }
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "stratus", "stratus")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
