//! Configuration system for Hush.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> explicit
//! config file -> environment -> overrides. The user config lives at
//! `~/.config/hush/config.toml` (platform equivalent via `directories`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for the Hush host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HushConfig {
    #[serde(default)]
    pub mixer: MixerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Where skill settings are persisted. Defaults to `<data_dir>/settings.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

impl HushConfig {
    /// Resolve the settings file, falling back to the platform data directory.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(default_settings_path)
    }
}

/// Which OS mixer interface to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerBackend {
    /// ALSA simple mixer control via `amixer`.
    Alsa,
    /// PipeWire default sink via `wpctl`.
    Pipewire,
    /// No mixer; mute/restore become no-ops.
    None,
}

impl std::fmt::Display for MixerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixerBackend::Alsa => write!(f, "alsa"),
            MixerBackend::Pipewire => write!(f, "pipewire"),
            MixerBackend::None => write!(f, "none"),
        }
    }
}

/// Configuration for the audio mixer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    pub backend: MixerBackend,
    /// ALSA simple control name (e.g., "Master", "PCM").
    pub control: String,
    /// ALSA card index or name (None = default card).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    /// PipeWire node to drive.
    pub sink: String,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            backend: MixerBackend::Alsa,
            control: "Master".to_string(),
            card: None,
            sink: "@DEFAULT_AUDIO_SINK@".to_string(),
        }
    }
}

/// Where spoken dialogs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// Write the utterance to the log.
    Log,
    /// Run an external TTS program with the utterance as the last argument.
    Command,
    /// Drop utterances silently.
    None,
}

/// Configuration for speech output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    /// TTS program for the `command` backend.
    pub command: String,
    /// Extra arguments placed before the utterance.
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory of `<name>.dialog` files overriding the built-in phrases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_dir: Option<PathBuf>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::Log,
            command: "espeak".to_string(),
            args: Vec::new(),
            dialog_dir: None,
        }
    }
}

/// Platform directories for Hush (config, data, logs).
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "hush", "hush")
}

/// Default location of the persisted skill settings.
pub fn default_settings_path() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("settings.json"))
}

/// Load configuration from all sources with layered merging.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `HUSH_`)
/// 3. Explicit config file (`--config`)
/// 4. User config (`~/.config/hush/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&HushConfig>,
) -> Result<HushConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(HushConfig::default()));

    // User-level config
    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Explicit config file must exist
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (HUSH_MIXER__BACKEND, HUSH_SPEECH__COMMAND, etc.)
    figment = figment.merge(Env::prefixed("HUSH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
