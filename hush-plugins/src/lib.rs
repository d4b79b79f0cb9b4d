//! # Hush Plugins
//!
//! Skill system for the Hush host. Skills implement [`Plugin`], are loaded
//! into a [`PluginManager`], and receive scheduled events, bus messages,
//! matched intents and settings changes through a [`SkillContext`].

pub mod context;
pub mod intents;
pub mod quiet_hours;
pub mod validation;

use chrono::{DateTime, Utc};
use hush_core::bus::{BusMessage, EventBus};
use hush_core::error::{SchedulerError, SettingsError, SpeechError};
use hush_core::scheduler::Scheduler;
use hush_core::settings::SettingsStore;
use hush_core::speech::Speech;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub use context::{SkillContext, SkillScheduler};
pub use intents::{IntentDef, IntentMatch, IntentMatcher};
pub use quiet_hours::QuietHoursSkill;
pub use validation::{PluginValidator, ValidationResult};

/// Errors from plugin operations.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),
    #[error("Plugin already loaded: {0}")]
    AlreadyLoaded(String),
    #[error("Failed to load plugin: {0}")]
    LoadFailed(String),
    #[error("Invalid plugin metadata: {0}")]
    InvalidMetadata(String),
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),
}

/// Metadata about a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name. Also the namespace of its scheduled events.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Author.
    pub author: Option<String>,
}

/// The trait every skill implements.
///
/// All callbacks run on the host's single dispatch task, one at a time,
/// with the skill's own settings and host services lent through `ctx`.
pub trait Plugin: Send {
    /// Get plugin metadata.
    fn metadata(&self) -> PluginMetadata;

    /// Called once after the plugin is loaded.
    fn initialize(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError>;

    /// Called when the plugin is unloaded.
    fn shutdown(&mut self, ctx: &mut SkillContext<'_>) -> Result<(), PluginError>;

    /// Called after the host changed this skill's settings.
    fn settings_changed(&mut self, _ctx: &mut SkillContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Intents this plugin answers to.
    fn intents(&self) -> Vec<IntentDef> {
        Vec::new()
    }

    /// Handle one of this plugin's intents.
    fn handle_intent(
        &mut self,
        _ctx: &mut SkillContext<'_>,
        _intent: &str,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Handle a bus message. Returns whether the plugin consumed it.
    fn handle_event(
        &mut self,
        _ctx: &mut SkillContext<'_>,
        _message: &BusMessage,
    ) -> Result<bool, PluginError> {
        Ok(false)
    }

    /// Handle one of this plugin's scheduled events (name without namespace).
    fn handle_scheduled(
        &mut self,
        _ctx: &mut SkillContext<'_>,
        _event: &str,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// State of a loaded plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginState {
    pub metadata: PluginMetadata,
    pub loaded_at: DateTime<Utc>,
    /// File backing the plugin's settings, if any.
    pub settings_path: Option<PathBuf>,
}

/// Manages plugin lifecycle and routes host events to plugins.
pub struct PluginManager {
    plugins: HashMap<String, PluginEntry>,
    scheduler: Box<dyn Scheduler>,
    speech: Speech,
    bus: EventBus,
    matcher: IntentMatcher,
    validator: PluginValidator,
}

struct PluginEntry {
    plugin: Box<dyn Plugin>,
    settings: SettingsStore,
    state: PluginState,
}

impl PluginEntry {
    /// Persist settings if they changed and have a backing file.
    fn persist_if_dirty(&mut self) {
        if self.settings.is_dirty() && self.settings.path().is_some() {
            if let Err(e) = self.settings.save() {
                warn!(
                    "Failed to save settings for '{}': {}",
                    self.state.metadata.name, e
                );
            }
        }
    }
}

impl PluginManager {
    /// Create a plugin manager over the host's scheduler, speech and bus.
    pub fn new(scheduler: Box<dyn Scheduler>, speech: Speech, bus: EventBus) -> Self {
        Self {
            plugins: HashMap::new(),
            scheduler,
            speech,
            bus,
            matcher: IntentMatcher::new(),
            validator: PluginValidator::new(),
        }
    }


    /// Load a plugin with fresh in-memory settings.
    pub fn load(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        self.load_with_settings(plugin, SettingsStore::new())
    }

    /// Load a plugin with the given settings store and initialize it.
    pub fn load_with_settings(
        &mut self,
        plugin: Box<dyn Plugin>,
        settings: SettingsStore,
    ) -> Result<(), PluginError> {
        let metadata = plugin.metadata();
        let name = metadata.name.clone();

        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyLoaded(name));
        }

        let validation = self.validator.validate(&metadata);
        for warning in &validation.warnings {
            warn!("Plugin '{}': {}", name, warning);
        }
        if !validation.is_valid {
            return Err(PluginError::InvalidMetadata(
                validation
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "Unknown metadata issue".into()),
            ));
        }

        let mut entry = PluginEntry {
            state: PluginState {
                metadata: metadata.clone(),
                loaded_at: Utc::now(),
                settings_path: settings.path().map(|p| p.to_path_buf()),
            },
            plugin,
            settings,
        };

        {
            let mut ctx = SkillContext::new(
                &name,
                &mut entry.settings,
                self.scheduler.as_mut(),
                &self.speech,
                &self.bus,
            );
            entry
                .plugin
                .initialize(&mut ctx)
                .map_err(|e| PluginError::LoadFailed(format!("{}: {}", name, e)))?;
        }
        entry.persist_if_dirty();

        for intent in entry.plugin.intents() {
            self.matcher.register(&name, intent);
        }

        info!("Loaded plugin '{}' v{}", name, metadata.version);
        self.plugins.insert(name, entry);
        Ok(())
    }

    /// Unload a plugin by name. Its settings are persisted.
    pub fn unload(&mut self, name: &str) -> Result<(), PluginError> {
        let mut entry = self
            .plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.into()))?;
        self.matcher.unregister_plugin(name);

        let result = {
            let mut ctx = SkillContext::new(
                name,
                &mut entry.settings,
                self.scheduler.as_mut(),
                &self.speech,
                &self.bus,
            );
            entry.plugin.shutdown(&mut ctx)
        };
        if entry.settings.path().is_some() {
            entry.settings.save()?;
        }
        info!("Unloaded plugin '{}'", name);
        result
    }

    /// Unload every plugin, logging failures.
    pub fn shutdown_all(&mut self) {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Err(e) = self.unload(&name) {
                warn!("Error unloading plugin '{}': {}", name, e);
            }
        }
    }

    /// Route a fired scheduler name (`<plugin>:<event>`) to its plugin.
    /// Returns whether a plugin received it.
    pub fn dispatch_scheduled(&mut self, full_name: &str) -> Result<bool, PluginError> {
        let Some((plugin_name, event)) = full_name.split_once(':') else {
            warn!("Scheduled event '{}' has no plugin namespace", full_name);
            return Ok(false);
        };
        let Some(entry) = self.plugins.get_mut(plugin_name) else {
            warn!("Scheduled event '{}' for unknown plugin", full_name);
            return Ok(false);
        };
        debug!("Dispatching scheduled '{}' to '{}'", event, plugin_name);
        let result = {
            let mut ctx = SkillContext::new(
                plugin_name,
                &mut entry.settings,
                self.scheduler.as_mut(),
                &self.speech,
                &self.bus,
            );
            entry.plugin.handle_scheduled(&mut ctx, event)
        };
        entry.persist_if_dirty();
        result.map(|_| true)
    }

    /// Offer a bus message to every plugin. Returns how many consumed it.
    pub fn dispatch_event(&mut self, message: &BusMessage) -> Result<usize, PluginError> {
        let mut handled = 0;
        for (name, entry) in self.plugins.iter_mut() {
            let result = {
                let mut ctx = SkillContext::new(
                    name,
                    &mut entry.settings,
                    self.scheduler.as_mut(),
                    &self.speech,
                    &self.bus,
                );
                entry.plugin.handle_event(&mut ctx, message)
            };
            entry.persist_if_dirty();
            if result? {
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Match an utterance against registered intents and run the best one.
    pub fn handle_utterance(&mut self, utterance: &str) -> Result<Option<IntentMatch>, PluginError> {
        let Some(matched) = self.matcher.match_utterance(utterance) else {
            debug!("No intent matched '{}'", utterance);
            return Ok(None);
        };
        let entry = self
            .plugins
            .get_mut(&matched.plugin)
            .ok_or_else(|| PluginError::NotFound(matched.plugin.clone()))?;
        info!("Intent '{}:{}' matched", matched.plugin, matched.intent);
        let result = {
            let mut ctx = SkillContext::new(
                &matched.plugin,
                &mut entry.settings,
                self.scheduler.as_mut(),
                &self.speech,
                &self.bus,
            );
            entry.plugin.handle_intent(&mut ctx, &matched.intent)
        };
        entry.persist_if_dirty();
        result.map(|_| Some(matched))
    }

    /// Notify a plugin that its settings changed.
    pub fn notify_settings_changed(&mut self, name: &str) -> Result<(), PluginError> {
        let entry = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.into()))?;
        let result = {
            let mut ctx = SkillContext::new(
                name,
                &mut entry.settings,
                self.scheduler.as_mut(),
                &self.speech,
                &self.bus,
            );
            entry.plugin.settings_changed(&mut ctx)
        };
        entry.persist_if_dirty();
        result
    }

    /// Re-read a plugin's settings file, then notify it.
    pub fn reload_settings(&mut self, name: &str) -> Result<(), PluginError> {
        let entry = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.into()))?;
        entry.settings.reload()?;
        info!("Reloaded settings for '{}'", name);
        self.notify_settings_changed(name)
    }

    /// Reload every plugin with a settings file.
    pub fn reload_all_settings(&mut self) {
        let mut names: Vec<String> = self
            .plugins
            .iter()
            .filter(|(_, e)| e.settings.path().is_some())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        for name in names {
            if let Err(e) = self.reload_settings(&name) {
                warn!("Failed to reload settings for '{}': {}", name, e);
            }
        }
    }

    /// Change one setting of a plugin and notify it.
    pub fn update_setting(
        &mut self,
        name: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), PluginError> {
        let entry = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.into()))?;
        entry.settings.set(key, value);
        self.notify_settings_changed(name)
    }

    /// A plugin's settings.
    pub fn settings(&self, name: &str) -> Option<&SettingsStore> {
        self.plugins.get(name).map(|e| &e.settings)
    }

    /// List all loaded plugins.
    pub fn list(&self) -> Vec<&PluginState> {
        let mut states: Vec<&PluginState> = self.plugins.values().map(|e| &e.state).collect();
        states.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        states
    }

    /// Get a plugin state by name.
    pub fn get(&self, name: &str) -> Option<&PluginState> {
        self.plugins.get(name).map(|e| &e.state)
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugins are loaded.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The host scheduler.
    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    /// The host event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The intent matcher.
    pub fn intents(&self) -> &IntentMatcher {
        &self.matcher
    }
}
