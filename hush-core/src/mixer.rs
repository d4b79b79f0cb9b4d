//! OS audio mixer: read and set the system output volume (0-100).
//!
//! `AlsaMixer` drives an ALSA simple control through `amixer`, `PipewireMixer`
//! drives the default sink through `wpctl`. `MockMixer` is always available
//! for tests. Opening goes through a `MixerOpener` so acquisition can be
//! retried and faked.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

use crate::config::{MixerBackend, MixerConfig};
use crate::error::MixerError;

/// A handle on a system volume control.
pub trait Mixer: Send + Sync {
    /// Current volume in percent.
    fn volume(&self) -> Result<u8, MixerError>;

    /// Set the volume in percent. Values above 100 are rejected.
    fn set_volume(&self, volume: u8) -> Result<(), MixerError>;

    /// Mixer name for logging.
    fn name(&self) -> &str;
}

/// Something that can open a mixer handle.
pub trait MixerOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn Mixer>, MixerError>;
}

/// Open a mixer, retrying exactly once. Returns `None` after two failures.
pub fn acquire_mixer(opener: &dyn MixerOpener) -> Option<Box<dyn Mixer>> {
    match opener.open() {
        Ok(mixer) => Some(mixer),
        Err(first) => {
            debug!("Mixer open failed ({}), retrying once", first);
            match opener.open() {
                Ok(mixer) => Some(mixer),
                Err(e) => {
                    error!("Couldn't allocate mixer: {}", e);
                    None
                }
            }
        }
    }
}

fn check_range(volume: u8) -> Result<(), MixerError> {
    if volume > 100 {
        return Err(MixerError::VolumeOutOfRange {
            volume: volume as u32,
        });
    }
    Ok(())
}

fn run(program: &str, args: &[String]) -> Result<String, MixerError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| MixerError::CommandFailed {
            command: program.to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(MixerError::CommandFailed {
            command: program.to_string(),
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ── ALSA ────────────────────────────────────────────────────────────

/// ALSA simple mixer control, driven through `amixer`.
pub struct AlsaMixer {
    control: String,
    card: Option<String>,
    name: String,
}

impl AlsaMixer {
    pub fn new(control: impl Into<String>, card: Option<String>) -> Self {
        let control = control.into();
        let name = match &card {
            Some(card) => format!("alsa:{}:{}", card, control),
            None => format!("alsa:{}", control),
        };
        Self {
            control,
            card,
            name,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(card) = &self.card {
            args.push("-c".to_string());
            args.push(card.clone());
        }
        // Mapped volume, matching what desktop mixers display.
        args.push("-M".to_string());
        args
    }
}

/// Parse the first channel's `[NN%]` from `amixer get` output.
pub(crate) fn parse_amixer_volume(output: &str) -> Option<u8> {
    output.lines().find_map(|line| {
        let start = line.find('[')?;
        let rest = &line[start + 1..];
        let end = rest.find("%]")?;
        rest[..end].trim().parse::<u8>().ok().map(|v| v.min(100))
    })
}

impl Mixer for AlsaMixer {
    fn volume(&self) -> Result<u8, MixerError> {
        let mut args = self.base_args();
        args.push("get".to_string());
        args.push(self.control.clone());
        let output = run("amixer", &args)?;
        parse_amixer_volume(&output).ok_or(MixerError::ParseError { output })
    }

    fn set_volume(&self, volume: u8) -> Result<(), MixerError> {
        check_range(volume)?;
        let mut args = self.base_args();
        args.extend([
            "-q".to_string(),
            "set".to_string(),
            self.control.clone(),
            format!("{}%", volume),
        ]);
        run("amixer", &args)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── PipeWire ────────────────────────────────────────────────────────

/// PipeWire sink volume, driven through `wpctl`.
pub struct PipewireMixer {
    sink: String,
    name: String,
}

impl PipewireMixer {
    pub fn new(sink: impl Into<String>) -> Self {
        let sink = sink.into();
        let name = format!("pipewire:{}", sink);
        Self { sink, name }
    }
}

/// Parse `wpctl get-volume` output: "Volume: 0.45" or "Volume: 0.45 [MUTED]".
pub(crate) fn parse_wpctl_volume(output: &str) -> Option<u8> {
    let mut parts = output.split_whitespace();
    if parts.next()? != "Volume:" {
        return None;
    }
    let level: f32 = parts.next()?.parse().ok()?;
    Some((level * 100.0).round().clamp(0.0, 100.0) as u8)
}

impl Mixer for PipewireMixer {
    fn volume(&self) -> Result<u8, MixerError> {
        let output = run("wpctl", &["get-volume".to_string(), self.sink.clone()])?;
        parse_wpctl_volume(&output).ok_or(MixerError::ParseError { output })
    }

    fn set_volume(&self, volume: u8) -> Result<(), MixerError> {
        check_range(volume)?;
        run(
            "wpctl",
            &[
                "set-volume".to_string(),
                self.sink.clone(),
                format!("{:.2}", volume as f32 / 100.0),
            ],
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── Opening ─────────────────────────────────────────────────────────

/// Opens the mixer named by the configuration and probes it once.
pub struct SystemMixerOpener {
    config: MixerConfig,
}

impl SystemMixerOpener {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }
}

impl MixerOpener for SystemMixerOpener {
    fn open(&self) -> Result<Box<dyn Mixer>, MixerError> {
        let mixer: Box<dyn Mixer> = match self.config.backend {
            MixerBackend::Alsa => Box::new(AlsaMixer::new(
                self.config.control.clone(),
                self.config.card.clone(),
            )),
            MixerBackend::Pipewire => Box::new(PipewireMixer::new(self.config.sink.clone())),
            MixerBackend::None => {
                return Err(MixerError::Unavailable {
                    message: "mixer backend is 'none'".into(),
                });
            }
        };
        let level = mixer.volume()?;
        debug!("Opened mixer {} at {}%", mixer.name(), level);
        Ok(mixer)
    }
}

// ── Mock ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MockMixerState {
    volume: u8,
    history: Vec<u8>,
    fail_reads: bool,
}

/// An in-memory mixer for testing. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMixer {
    state: Arc<Mutex<MockMixerState>>,
}

impl MockMixer {
    /// Create a mock mixer at the given volume.
    pub fn new(volume: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockMixerState {
                volume,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockMixerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current volume without going through the trait.
    pub fn level(&self) -> u8 {
        self.lock().volume
    }

    /// Every value passed to `set_volume`, in order.
    pub fn history(&self) -> Vec<u8> {
        self.lock().history.clone()
    }

    /// Make `volume()` fail from now on.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Change the level behind the controller's back (e.g., user turned a knob).
    pub fn nudge(&self, volume: u8) {
        self.lock().volume = volume;
    }
}

impl Mixer for MockMixer {
    fn volume(&self) -> Result<u8, MixerError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(MixerError::Unavailable {
                message: "mock read failure".into(),
            });
        }
        Ok(state.volume)
    }

    fn set_volume(&self, volume: u8) -> Result<(), MixerError> {
        check_range(volume)?;
        let mut state = self.lock();
        state.volume = volume;
        state.history.push(volume);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Opener for tests: fails a fixed number of times, then hands out a `MockMixer`.
pub struct MockMixerOpener {
    mixer: MockMixer,
    failures: usize,
    attempts: AtomicUsize,
}

impl MockMixerOpener {
    /// Always succeeds.
    pub fn new(mixer: MockMixer) -> Self {
        Self::failing(mixer, 0)
    }

    /// Fails the first `failures` attempts.
    pub fn failing(mixer: MockMixer, failures: usize) -> Self {
        Self {
            mixer,
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of times `open` was called.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl MixerOpener for MockMixerOpener {
    fn open(&self) -> Result<Box<dyn Mixer>, MixerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        if attempt < self.failures {
            warn!("Mock mixer open attempt {} failing", attempt + 1);
            return Err(MixerError::Unavailable {
                message: format!("mock failure {}", attempt + 1),
            });
        }
        Ok(Box::new(self.mixer.clone()))
    }
}
