//! Configuration settings for Stemme.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub converter: ConverterSettings,
    pub recognition: RecognitionSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory holding per-request scratch files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            temp_dir: "temp_audio".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allow credentialed cross-origin requests.
    pub allow_credentials: bool,
    /// Maximum accepted request body, in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            allow_credentials: true,
            max_upload_mb: 50,
        }
    }
}

/// Audio converter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Sample rate of the rendered WAV, in Hz.
    pub sample_rate: u32,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            sample_rate: 16_000,
        }
    }
}

/// Picks the converter binary for this platform.
///
/// On Windows a bundled `ffmpeg.exe` in the working directory wins over
/// whatever is on `PATH`.
fn default_ffmpeg_path() -> String {
    if cfg!(windows) {
        if let Ok(cwd) = std::env::current_dir() {
            let bundled = cwd.join("ffmpeg.exe");
            if bundled.exists() {
                return bundled.to_string_lossy().into_owned();
            }
        }
    }
    "ffmpeg".to_string()
}

/// Speech recognition service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Base URL of the Speech-to-Text API.
    pub endpoint: String,
    /// BCP-47 language code of the spoken audio.
    pub language: String,
    /// Recognition model (None = service default).
    pub model: Option<String>,
    /// Ask the service to insert punctuation.
    pub enable_punctuation: bool,
    /// Mask profanities in the transcript.
    pub profanity_filter: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// API key (takes precedence over service-account credentials).
    pub api_key: Option<String>,
    /// Path to a service-account JSON file.
    pub credentials_file: Option<String>,
}

impl RecognitionSettings {
    /// Expanded credentials file path, if one is configured.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(Settings::expand_path)
    }
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://speech.googleapis.com".to_string(),
            language: "en-US".to_string(),
            model: None,
            enable_punctuation: true,
            profanity_filter: false,
            timeout_secs: 120,
            api_key: None,
            credentials_file: None,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> crate::error::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::error::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                crate::error::StemmeError::Config(format!("PORT is not a valid port: {}", port))
            })?;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(dir) = get("STEMME_TEMP_DIR") {
            self.general.temp_dir = dir;
        }
        if let Some(ffmpeg) = get("FFMPEG_PATH") {
            self.converter.ffmpeg_path = ffmpeg;
        }
        if let Some(key) = get("STEMME_GOOGLE_API_KEY") {
            self.recognition.api_key = Some(key);
        }
        if let Some(file) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.recognition.credentials_file = Some(file);
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stemme")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
