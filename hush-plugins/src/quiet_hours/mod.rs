//! Quiet Hours skill. Mutes system audio during a nightly window and
//! restores the previous volume afterward.
//!
//! Two daily events are registered with the host scheduler at the next
//! start and end boundaries. Every (re)initialization cancels them,
//! recomputes the window, registers them again and reconciles the mute
//! state with the current time.

pub mod settings;
pub mod window;

use hush_core::bus::BusMessage;
use hush_core::clock::{Clock, SystemClock};
use hush_core::mixer::{Mixer, MixerOpener, acquire_mixer};
use hush_core::scheduler::daily;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::SkillContext;
use crate::intents::IntentDef;
use crate::{Plugin, PluginError, PluginMetadata};

pub use settings::{QuietHoursSettings, clamp_volume, init_settings};
pub use window::{QuietWindow, compute_window, should_turn_on_now};

pub const SKILL_NAME: &str = "quiet_hours";
pub const ON_EVENT_NAME: &str = "quiet_hours_on";
pub const OFF_EVENT_NAME: &str = "quiet_hours_off";
/// Bus message asking whether quiet hours are in effect.
pub const QUERY_EVENT: &str = "quiet_hours.query";
/// Name other Mycroft skills already send for the same question.
pub const MYCROFT_QUERY_EVENT: &str = "private.mycroftai.quiet_hours";

/// How many activations also explain that the wake word still works.
const WAKE_WORD_REMINDERS: u32 = 5;

/// The skill's intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuietHoursIntent {
    Enable,
    Disable,
    Activate,
    Deactivate,
}

impl QuietHoursIntent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Enable, Self::Disable, Self::Activate, Self::Deactivate]
            .into_iter()
            .find(|i| i.name() == name)
    }
}

const TOPIC: &[&str] = &["quiet hours", "quiet time", "quiet mode", "night mode"];

pub struct QuietHoursSkill {
    opener: Box<dyn MixerOpener>,
    clock: Arc<dyn Clock>,
    mixer: Option<Box<dyn Mixer>>,
    saved_volume: Option<u8>,
    window: Option<QuietWindow>,
    wake_word_reminders: u32,
}

impl QuietHoursSkill {
    pub fn new(opener: Box<dyn MixerOpener>, clock: Arc<dyn Clock>) -> Self {
        Self {
            opener,
            clock,
            mixer: None,
            saved_volume: None,
            window: None,
            wake_word_reminders: WAKE_WORD_REMINDERS,
        }
    }

    /// Skill on the real local clock.
    pub fn with_system_clock(opener: Box<dyn MixerOpener>) -> Self {
        Self::new(opener, Arc::new(SystemClock))
    }

    /// Window computed at the last (re)initialization, if enabled.
    pub fn window(&self) -> Option<&QuietWindow> {
        self.window.as_ref()
    }

    pub fn saved_volume(&self) -> Option<u8> {
        self.saved_volume
    }

    pub fn has_mixer(&self) -> bool {
        self.mixer.is_some()
    }

    fn acquire(&mut self, ctx: &SkillContext<'_>) {
        debug!("Acquiring mixer");
        self.mixer = acquire_mixer(self.opener.as_ref());
        let Some(mixer) = self.mixer.as_deref() else {
            return;
        };
        info!("Using mixer '{}'", mixer.name());
        // While muted the current level is the quiet level, not a baseline.
        if ctx.settings.get_bool(settings::ACTIVE) {
            self.saved_volume = ctx
                .settings
                .get_i64(settings::SAVED_VOLUME)
                .map(clamp_volume);
            debug!("Muted at startup, persisted baseline {:?}", self.saved_volume);
            return;
        }
        match mixer.volume() {
            Ok(volume) => self.saved_volume = Some(volume),
            Err(e) => warn!("Could not read initial volume: {}", e),
        }
    }

    /// Cancel events, recompute the window, register events again and
    /// reconcile the mute state.
    pub fn reinit(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        debug!("Re-initializing quiet hours");
        Self::clear_events(ctx);
        let current = QuietHoursSettings::from_store(ctx.settings);
        debug!(
            "active={} saved_volume={:?}",
            current.active, self.saved_volume
        );

        if !current.enabled {
            info!("Quiet hours skill is DISABLED");
            self.window = None;
            if current.active {
                debug!("Turning off because not enabled");
                self.restore(ctx, true);
            }
            return Ok(());
        }

        info!("Quiet hours skill is ENABLED");
        let now = self.clock.now();
        let window = compute_window(&current, now);
        debug!(
            "Window {} -> {}",
            window.start.format("%Y-%m-%d %H:%M"),
            window.end.format("%Y-%m-%d %H:%M")
        );
        self.window = Some(window);
        ctx.scheduler
            .schedule_repeating(ON_EVENT_NAME, window.start, daily())?;
        ctx.scheduler
            .schedule_repeating(OFF_EVENT_NAME, window.end, daily())?;

        if window.contains(now) {
            debug!("Turning on because enabled and inside the window");
            self.on(ctx, true);
        } else if current.active {
            debug!("Turning off because enabled but outside the window");
            self.off(ctx, true);
        }
        Ok(())
    }

    fn clear_events(ctx: &mut SkillContext<'_>) {
        ctx.scheduler.cancel(ON_EVENT_NAME);
        ctx.scheduler.cancel(OFF_EVENT_NAME);
    }

    /// Mute: remember the current volume, mark active, optionally announce,
    /// then set the quiet level. No-op when disabled or without a mixer.
    pub fn on(&mut self, ctx: &mut SkillContext<'_>, speak: bool) {
        debug!("Executing ON");
        if !ctx.settings.get_bool(settings::ENABLED) {
            return;
        }
        let Some(mixer) = self.mixer.as_deref() else {
            warn!("Could not set volume! Could not get mixer!");
            return;
        };

        let already_active = ctx.settings.get_bool(settings::ACTIVE);
        if !already_active || self.saved_volume.is_none() {
            match mixer.volume() {
                Ok(volume) => {
                    self.saved_volume = Some(volume);
                    ctx.settings.set(settings::SAVED_VOLUME, volume);
                }
                Err(e) => {
                    warn!("Could not read volume, not muting: {}", e);
                    return;
                }
            }
        }

        debug!("Quiet hours are in effect");
        ctx.settings.set(settings::ACTIVE, true);
        if speak {
            Self::speak(ctx, "on", true);
            if self.wake_word_reminders > 0 {
                self.wake_word_reminders -= 1;
                Self::speak(ctx, "wake.word", true);
            }
        }

        let quiet = QuietHoursSettings::from_store(ctx.settings).set_volume_to;
        match mixer.set_volume(quiet) {
            Ok(()) => debug!("Volume set to {}", quiet),
            Err(e) => warn!("Could not set volume to {}: {}", quiet, e),
        }
    }

    /// Unmute: restore the remembered volume, clear active, optionally
    /// announce. No-op when disabled or without a mixer.
    pub fn off(&mut self, ctx: &mut SkillContext<'_>, speak: bool) {
        debug!("Executing OFF");
        if !ctx.settings.get_bool(settings::ENABLED) {
            return;
        }
        self.restore(ctx, speak);
    }

    fn restore(&mut self, ctx: &mut SkillContext<'_>, speak: bool) {
        let Some(mixer) = self.mixer.as_deref() else {
            warn!("Could not set volume! Could not get mixer!");
            return;
        };
        match self.saved_volume {
            Some(volume) => match mixer.set_volume(volume) {
                Ok(()) => debug!("Volume set to {}", volume),
                Err(e) => warn!("Could not restore volume {}: {}", volume, e),
            },
            None => warn!("No saved volume to restore"),
        }

        debug!("Quiet hours not in effect anymore");
        ctx.settings.set(settings::ACTIVE, false);
        ctx.settings.remove(settings::SAVED_VOLUME);
        if speak {
            Self::speak(ctx, "off", false);
        }
    }

    fn speak(ctx: &SkillContext<'_>, dialog: &str, wait: bool) {
        if let Err(e) = ctx.speech.speak_dialog(dialog, wait) {
            warn!("Could not speak '{}': {}", dialog, e);
        }
    }

    fn handle_enable(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        if ctx.settings.get_bool(settings::ENABLED) {
            Self::speak(ctx, "already.enabled", false);
            return Ok(());
        }
        ctx.settings.set(settings::ENABLED, true);
        Self::speak(ctx, "now.enabled", false);
        self.reinit(ctx)
    }

    fn handle_disable(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        if !ctx.settings.get_bool(settings::ENABLED) {
            Self::speak(ctx, "already.disabled", false);
            return Ok(());
        }
        ctx.settings.set(settings::ENABLED, false);
        Self::speak(ctx, "now.disabled", false);
        self.reinit(ctx)
    }
}

impl Plugin for QuietHoursSkill {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: SKILL_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Mute audio during nightly quiet hours and restore it afterward".into(),
            author: None,
        }
    }

    fn initialize(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        debug!("Initializing quiet hours");
        init_settings(ctx.settings);
        self.acquire(ctx);
        self.reinit(ctx)
    }

    fn shutdown(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        debug!("Shutting down quiet hours");
        Self::clear_events(ctx);
        self.mixer = None;
        Ok(())
    }

    fn settings_changed(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        init_settings(ctx.settings);
        self.reinit(ctx)
    }

    fn intents(&self) -> Vec<IntentDef> {
        vec![
            IntentDef::new(QuietHoursIntent::Enable.name())
                .require(TOPIC)
                .require(&["enable"]),
            IntentDef::new(QuietHoursIntent::Disable.name())
                .require(TOPIC)
                .require(&["disable"]),
            IntentDef::new(QuietHoursIntent::Activate.name())
                .require(TOPIC)
                .require(&["activate", "start", "begin", "turn on", "switch on"]),
            IntentDef::new(QuietHoursIntent::Deactivate.name())
                .require(TOPIC)
                .require(&["deactivate", "stop", "end", "turn off", "switch off"]),
        ]
    }

    fn handle_intent(
        &mut self,
        ctx: &mut SkillContext<'_>,
        intent: &str,
    ) -> Result<(), PluginError> {
        let Some(intent) = QuietHoursIntent::from_name(intent) else {
            return Err(PluginError::ExecutionError(format!(
                "Unknown intent '{}'",
                intent
            )));
        };
        debug!("Handling intent {:?}", intent);
        match intent {
            QuietHoursIntent::Enable => self.handle_enable(ctx),
            QuietHoursIntent::Disable => self.handle_disable(ctx),
            QuietHoursIntent::Activate | QuietHoursIntent::Deactivate => {
                if !ctx.settings.get_bool(settings::ENABLED) {
                    Self::speak(ctx, "disabled", false);
                } else if intent == QuietHoursIntent::Activate {
                    self.on(ctx, true);
                } else {
                    self.off(ctx, true);
                }
                Ok(())
            }
        }
    }

    fn handle_event(
        &mut self,
        ctx: &mut SkillContext<'_>,
        message: &BusMessage,
    ) -> Result<bool, PluginError> {
        if message.msg_type != QUERY_EVENT && message.msg_type != MYCROFT_QUERY_EVENT {
            return Ok(false);
        }
        let active = ctx.settings.get_bool(settings::ACTIVE);
        ctx.bus
            .emit(message.response(json!({ "quiet_hours_on": active })));
        Ok(true)
    }

    fn handle_scheduled(
        &mut self,
        ctx: &mut SkillContext<'_>,
        event: &str,
    ) -> Result<(), PluginError> {
        match event {
            ON_EVENT_NAME => self.on(ctx, true),
            OFF_EVENT_NAME => self.off(ctx, true),
            other => warn!("Unknown scheduled event '{}'", other),
        }
        Ok(())
    }
}
