//! Quiet hours settings: keys, defaults and normalization.

use hush_core::settings::SettingsStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENABLED: &str = "enabled";
pub const START_HOUR: &str = "start_time_hour";
pub const START_MIN: &str = "start_time_min";
pub const END_HOUR: &str = "end_time_hour";
pub const END_MIN: &str = "end_time_min";
pub const USE_NAPTIME: &str = "use_naptime";
pub const SET_VOLUME_TO: &str = "set_volume_to";
pub const ACTIVE: &str = "active";
/// Volume before muting, kept so a restart while muted can still restore it.
pub const SAVED_VOLUME: &str = "saved_volume";

pub const DEFAULT_START_HOUR: u32 = 22;
pub const DEFAULT_START_MIN: u32 = 0;
pub const DEFAULT_END_HOUR: u32 = 8;
pub const DEFAULT_END_MIN: u32 = 0;

/// Typed view of the skill's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHoursSettings {
    pub enabled: bool,
    pub start_hour: u32,
    pub start_min: u32,
    pub end_hour: u32,
    pub end_min: u32,
    /// Stored for compatibility; nothing reads it.
    pub use_naptime: bool,
    pub set_volume_to: u8,
    pub active: bool,
}

impl Default for QuietHoursSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: DEFAULT_START_HOUR,
            start_min: DEFAULT_START_MIN,
            end_hour: DEFAULT_END_HOUR,
            end_min: DEFAULT_END_MIN,
            use_naptime: true,
            set_volume_to: 0,
            active: false,
        }
    }
}

/// Clamp a configured volume to 0..=100.
pub fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, 100) as u8
}

/// Add missing defaults and clamp `set_volume_to` in place.
pub fn init_settings(store: &mut SettingsStore) {
    let defaults = QuietHoursSettings::default();
    store.setdefault(ENABLED, defaults.enabled);
    store.setdefault(START_HOUR, defaults.start_hour);
    store.setdefault(START_MIN, defaults.start_min);
    store.setdefault(END_HOUR, defaults.end_hour);
    store.setdefault(END_MIN, defaults.end_min);
    store.setdefault(USE_NAPTIME, defaults.use_naptime);
    store.setdefault(SET_VOLUME_TO, defaults.set_volume_to);

    match store.get_i64(SET_VOLUME_TO) {
        Some(volume) => {
            let clamped = clamp_volume(volume);
            if i64::from(clamped) != volume {
                warn!("{} = {} out of range, clamped to {}", SET_VOLUME_TO, volume, clamped);
            }
            // Also normalizes numeric strings and whole floats to an integer.
            store.set(SET_VOLUME_TO, clamped);
        }
        None => {
            warn!(
                "{} = {:?} is not a number, using 0",
                SET_VOLUME_TO,
                store.get(SET_VOLUME_TO)
            );
            store.set(SET_VOLUME_TO, 0);
        }
    }

    store.setdefault(ACTIVE, defaults.active);
}

fn time_part(store: &SettingsStore, key: &str, max: u32, default: u32) -> u32 {
    match store.get_i64(key) {
        Some(v) if (0..=i64::from(max)).contains(&v) => v as u32,
        Some(v) => {
            warn!("{} = {} out of range 0..={}, using {}", key, v, max, default);
            default
        }
        None => {
            if store.contains_key(key) {
                warn!("{} is not an integer, using {}", key, default);
            }
            default
        }
    }
}

impl QuietHoursSettings {
    /// Read the settings, falling back to defaults for invalid times.
    pub fn from_store(store: &SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            enabled: store.get_bool(ENABLED),
            start_hour: time_part(store, START_HOUR, 23, defaults.start_hour),
            start_min: time_part(store, START_MIN, 59, defaults.start_min),
            end_hour: time_part(store, END_HOUR, 23, defaults.end_hour),
            end_min: time_part(store, END_MIN, 59, defaults.end_min),
            use_naptime: if store.contains_key(USE_NAPTIME) {
                store.get_bool(USE_NAPTIME)
            } else {
                defaults.use_naptime
            },
            set_volume_to: store
                .get_i64(SET_VOLUME_TO)
                .map(clamp_volume)
                .unwrap_or(defaults.set_volume_to),
            active: store.get_bool(ACTIVE),
        }
    }
}
