//! Error types for the Hush host contracts.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the mixer, scheduler, speech, settings, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the Hush core library.
#[derive(Debug, thiserror::Error)]
pub enum HushError {
    #[error("Mixer error: {0}")]
    Mixer(#[from] MixerError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the OS audio mixer.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("Mixer unavailable: {message}")]
    Unavailable { message: String },

    #[error("Mixer command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Could not parse mixer output: {output}")]
    ParseError { output: String },

    #[error("Volume {volume} out of range 0-100")]
    VolumeOutOfRange { volume: u32 },
}

/// Errors from the daily scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduled event not found: {name}")]
    EventNotFound { name: String },

    #[error("Invalid repeat interval for '{name}': {message}")]
    InvalidInterval { name: String, message: String },

    #[error("No async runtime available to schedule '{name}'")]
    NoRuntime { name: String },
}

/// Errors from speech output.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Unknown dialog: {name}")]
    UnknownDialog { name: String },

    #[error("Dialog file {path} could not be read: {message}")]
    DialogRead { path: PathBuf, message: String },

    #[error("Speech command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },
}

/// Errors from the host settings store.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Settings file is not a JSON object: {path}")]
    NotAnObject { path: PathBuf },

    #[error("Settings store has no backing file")]
    NoBackingFile,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `HushError`.
pub type Result<T> = std::result::Result<T, HushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_mixer() {
        let err = HushError::Mixer(MixerError::Unavailable {
            message: "no default card".into(),
        });
        assert_eq!(
            err.to_string(),
            "Mixer error: Mixer unavailable: no default card"
        );
    }

    #[test]
    fn test_error_display_scheduler() {
        let err = HushError::Scheduler(SchedulerError::EventNotFound {
            name: "quiet_hours_on".into(),
        });
        assert_eq!(
            err.to_string(),
            "Scheduler error: Scheduled event not found: quiet_hours_on"
        );
    }

    #[test]
    fn test_error_display_speech() {
        let err = HushError::Speech(SpeechError::UnknownDialog {
            name: "wake.word".into(),
        });
        assert_eq!(err.to_string(), "Speech error: Unknown dialog: wake.word");
    }

    #[test]
    fn test_error_display_settings() {
        let err = HushError::Settings(SettingsError::NotAnObject {
            path: PathBuf::from("/tmp/settings.json"),
        });
        assert_eq!(
            err.to_string(),
            "Settings error: Settings file is not a JSON object: /tmp/settings.json"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HushError = io_err.into();
        assert!(matches!(err, HushError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: HushError = serde_err.into();
        assert!(matches!(err, HushError::Serialization(_)));
    }

    #[test]
    fn test_mixer_error_variants() {
        let err = MixerError::CommandFailed {
            command: "amixer".into(),
            message: "exit status 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Mixer command 'amixer' failed: exit status 1"
        );

        let err = MixerError::VolumeOutOfRange { volume: 140 };
        assert_eq!(err.to_string(), "Volume 140 out of range 0-100");
    }
}
