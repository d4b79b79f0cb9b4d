//! Speech output: render a named dialog and say it.
//!
//! Dialogs are looked up in an optional directory of `<name>.dialog` files
//! (one phrase per line, a random line is used) and fall back to built-in
//! English phrases. The rendered text goes to a `SpeechOutput` backend.

use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{SpeechBackend, SpeechConfig};
use crate::error::SpeechError;

/// Built-in phrases for the dialogs the quiet hours skill speaks.
const BUILTIN_DIALOGS: &[(&str, &str)] = &[
    ("on", "Quiet hours are now in effect."),
    (
        "wake.word",
        "I will stay quiet, but you can still wake me with the wake word.",
    ),
    ("off", "Quiet hours are over."),
    ("already.enabled", "Quiet hours are already enabled."),
    ("now.enabled", "Quiet hours are now enabled."),
    ("already.disabled", "Quiet hours are already disabled."),
    ("now.disabled", "Quiet hours are now disabled."),
    ("disabled", "Quiet hours are disabled. Enable them first."),
];

/// Resolves dialog names to phrases.
#[derive(Debug, Clone, Default)]
pub struct DialogRenderer {
    dir: Option<PathBuf>,
}

impl DialogRenderer {
    /// Built-in phrases only.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Prefer `<dir>/<name>.dialog`, fall back to built-in phrases.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn render(&self, name: &str) -> Result<String, SpeechError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.dialog", name));
            if path.exists() {
                let text =
                    std::fs::read_to_string(&path).map_err(|e| SpeechError::DialogRead {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                let lines: Vec<&str> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .collect();
                if let Some(line) = lines.choose(&mut rand::thread_rng()) {
                    return Ok((*line).to_string());
                }
                warn!("Dialog file {:?} has no phrases, using built-in", path);
            }
        }
        BUILTIN_DIALOGS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, phrase)| (*phrase).to_string())
            .ok_or_else(|| SpeechError::UnknownDialog {
                name: name.to_string(),
            })
    }
}

/// Where rendered utterances go.
pub trait SpeechOutput: Send + Sync {
    /// Say `utterance`. With `wait`, return only once it has been spoken.
    fn speak(&self, utterance: &str, wait: bool) -> Result<(), SpeechError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Writes utterances to the log.
#[derive(Debug, Default)]
pub struct LogSpeechOutput;

impl SpeechOutput for LogSpeechOutput {
    fn speak(&self, utterance: &str, _wait: bool) -> Result<(), SpeechError> {
        info!(target: "hush::speech", "{}", utterance);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Drops utterances.
#[derive(Debug, Default)]
pub struct SilentSpeechOutput;

impl SpeechOutput for SilentSpeechOutput {
    fn speak(&self, utterance: &str, _wait: bool) -> Result<(), SpeechError> {
        debug!("(silent) {}", utterance);
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Runs an external TTS program: `<command> <args...> <utterance>`.
#[derive(Debug, Clone)]
pub struct CommandSpeechOutput {
    command: String,
    args: Vec<String>,
}

impl CommandSpeechOutput {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    fn failed(&self, message: impl Into<String>) -> SpeechError {
        SpeechError::CommandFailed {
            command: self.command.clone(),
            message: message.into(),
        }
    }
}

impl SpeechOutput for CommandSpeechOutput {
    fn speak(&self, utterance: &str, wait: bool) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).arg(utterance);

        if wait {
            let status = cmd.status().map_err(|e| self.failed(e.to_string()))?;
            if !status.success() {
                return Err(self.failed(status.to_string()));
            }
        } else {
            let mut child = cmd.spawn().map_err(|e| self.failed(e.to_string()))?;
            // Reap in the background so the child does not linger as a zombie.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Records utterances for tests. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MockSpeechOutput {
    spoken: Arc<Mutex<Vec<(String, bool)>>>,
}

impl MockSpeechOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything spoken so far, with its `wait` flag.
    pub fn spoken(&self) -> Vec<(String, bool)> {
        self.spoken
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Just the utterances.
    pub fn utterances(&self) -> Vec<String> {
        self.spoken().into_iter().map(|(text, _)| text).collect()
    }
}

impl SpeechOutput for MockSpeechOutput {
    fn speak(&self, utterance: &str, wait: bool) -> Result<(), SpeechError> {
        self.spoken
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((utterance.to_string(), wait));
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Dialog rendering plus an output backend: what the host lends a skill.
pub struct Speech {
    renderer: DialogRenderer,
    output: Box<dyn SpeechOutput>,
}

impl Speech {
    pub fn new(renderer: DialogRenderer, output: Box<dyn SpeechOutput>) -> Self {
        Self { renderer, output }
    }

    /// Build from configuration.
    pub fn from_config(config: &SpeechConfig) -> Self {
        let renderer = match &config.dialog_dir {
            Some(dir) => DialogRenderer::with_dir(dir),
            None => DialogRenderer::builtin(),
        };
        let output: Box<dyn SpeechOutput> = match config.backend {
            SpeechBackend::Log => Box::new(LogSpeechOutput),
            SpeechBackend::Command => Box::new(CommandSpeechOutput::new(
                config.command.clone(),
                config.args.clone(),
            )),
            SpeechBackend::None => Box::new(SilentSpeechOutput),
        };
        Self::new(renderer, output)
    }

    /// Speak the named dialog, optionally blocking until it has been said.
    pub fn speak_dialog(&self, name: &str, wait: bool) -> Result<(), SpeechError> {
        let utterance = self.renderer.render(name)?;
        debug!("Speaking dialog '{}' via {}", name, self.output.name());
        self.output.speak(&utterance, wait)
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }
}
