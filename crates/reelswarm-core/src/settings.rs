//! Runtime settings and the composition root for service handles.
//!
//! Settings are read from `settings.json` in the data directory. Missing
//! files and missing keys fall back to defaults; `GEMINI_API_KEY` and
//! `REELSWARM_DATA_DIR` override the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SwarmError};
use crate::provider::{
    GeminiClient, GeminiMedia, Generator, MediaSynthesizer, RetryPolicy, RetryingGenerator,
};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DATA_DIR_ENV: &str = "REELSWARM_DATA_DIR";
pub const SETTINGS_FILE: &str = "settings.json";

/// Model names per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_fast_model")]
    pub fast: String,
    #[serde(default = "default_research_model")]
    pub research: String,
    #[serde(default = "default_image_model")]
    pub image: String,
    #[serde(default = "default_audio_model")]
    pub audio: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            fast: default_fast_model(),
            research: default_research_model(),
            image: default_image_model(),
            audio: default_audio_model(),
        }
    }
}

/// Everything the pipeline needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub models: ModelSettings,

    /// Prebuilt narration voice (default: Fenrir)
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    /// Root for the project database and rendered media (default: ./data)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Scores below this send the script through refine (default: 7.0)
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Refine passes allowed per run; `null` means unbounded (default: 3)
    #[serde(default = "default_max_refine_iterations")]
    pub max_refine_iterations: Option<u32>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            models: ModelSettings::default(),
            voice_name: default_voice_name(),
            data_dir: default_data_dir(),
            quality_threshold: default_quality_threshold(),
            max_refine_iterations: default_max_refine_iterations(),
            retry: RetryPolicy::default(),
        }
    }
}

// Default value functions
fn default_fast_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_research_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_audio_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_voice_name() -> String {
    "Fenrir".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_quality_threshold() -> f64 {
    7.0
}

fn default_max_refine_iterations() -> Option<u32> {
    Some(3)
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
                    SwarmError::Config(format!("invalid settings file {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "settings loaded");
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut settings = Self::load(path)?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply overrides from a variable lookup (injected for tests).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api_key = copy.api_key.as_ref().map(|k| {
            let tail: String = k.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{tail}")
        });
        copy
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

/// Provider handles shared by every agent of a pipeline.
///
/// Built once from [`Settings`]; changing credentials means building new
/// handles and a new service around them.
#[derive(Clone)]
pub struct ServiceHandles {
    pub generator: Arc<dyn Generator>,
    pub media: Arc<dyn MediaSynthesizer>,
}

impl ServiceHandles {
    pub fn new(generator: Arc<dyn Generator>, media: Arc<dyn MediaSynthesizer>) -> Self {
        Self { generator, media }
    }

    /// Gemini-backed handles with the configured retry policy.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = GeminiClient::new(settings.api_key.clone(), settings.models.clone())?;
        let media = GeminiMedia::new(
            client.clone(),
            settings.voice_name.clone(),
            settings.media_dir(),
            settings.retry.clone(),
        );
        let generator = RetryingGenerator::new(client, settings.retry.clone());

        Ok(Self {
            generator: Arc::new(generator),
            media: Arc::new(media),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.voice_name, "Fenrir");
        assert_eq!(settings.max_refine_iterations, Some(3));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"voice_name": "Puck", "max_refine_iterations": null}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.voice_name, "Puck");
        assert_eq!(settings.max_refine_iterations, None);
        assert_eq!(settings.quality_threshold, 7.0);
        assert_eq!(settings.retry.max_retries, 10);
    }

    #[test]
    fn invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(Settings::load(&path), Err(SwarmError::Config(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|key| match key {
            API_KEY_ENV => Some("secret-key-1234".to_string()),
            DATA_DIR_ENV => Some("/tmp/reels".to_string()),
            _ => None,
        });
        assert_eq!(settings.api_key.as_deref(), Some("secret-key-1234"));
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/reels"));
        assert_eq!(settings.redacted().api_key.as_deref(), Some("****1234"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");
        let settings = Settings {
            quality_threshold: 8.5,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }
}
