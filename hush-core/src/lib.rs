//! # Hush Core
//!
//! Host contracts for the Hush assistant runtime.
//! Provides the persistent settings store, the repeating-event scheduler,
//! the message bus, speech output, the system audio mixer, configuration,
//! and the error types shared by skills and the host.

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod mixer;
pub mod scheduler;
pub mod settings;
pub mod speech;

// Re-export commonly used types at the crate root.
pub use bus::{BusMessage, EventBus};
pub use clock::{Clock, FixedClock, SimulatedClock, SystemClock};
pub use config::{HushConfig, MixerBackend, MixerConfig, SpeechBackend, SpeechConfig, load_config};
pub use error::{
    ConfigError, HushError, MixerError, Result, SchedulerError, SettingsError, SpeechError,
};
pub use mixer::{Mixer, MixerOpener, MockMixer, MockMixerOpener, SystemMixerOpener, acquire_mixer};
pub use scheduler::{DailyScheduler, ManualScheduler, ScheduledEvent, Scheduler};
pub use settings::SettingsStore;
pub use speech::{DialogRenderer, MockSpeechOutput, Speech, SpeechOutput};
