//! Integration tests for the host contracts from the public API.

use chrono::{Local, TimeZone};
use hush_core::{
    BusMessage, DailyScheduler, EventBus, HushConfig, MixerBackend, MockMixer, MockMixerOpener,
    Scheduler, SettingsStore, SimulatedClock, SystemMixerOpener, acquire_mixer, load_config,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

// ── Settings persistence ────────────────────────────────────────────────

#[test]
fn test_settings_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let mut store = SettingsStore::load(&path);
    assert!(store.is_empty());
    store.setdefault("enabled", false);
    store.set("start_time_hour", 23);
    store.save().unwrap();
    assert!(!dir.path().join("nested").join("settings.json.tmp").exists());

    let restored = SettingsStore::load(&path);
    assert_eq!(restored.values(), store.values());
    assert_eq!(restored.get_i64("start_time_hour"), Some(23));
}

#[test]
fn test_corrupt_settings_file_yields_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut store = SettingsStore::load(&path);
    assert!(store.is_empty());
    assert!(store.reload().is_err());

    // Saving over the corrupt file repairs it.
    store.set("enabled", true);
    store.save().unwrap();
    assert!(SettingsStore::load(&path).get_bool("enabled"));
}

#[test]
fn test_settings_array_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();
    assert!(SettingsStore::load(&path).is_empty());
}

// ── Mixer acquisition ───────────────────────────────────────────────────

#[test]
fn test_acquire_retries_exactly_once() {
    let mixer = MockMixer::new(55);

    let opener = MockMixerOpener::failing(mixer.clone(), 1);
    let acquired = acquire_mixer(&opener).unwrap();
    assert_eq!(acquired.volume().unwrap(), 55);
    assert_eq!(opener.attempts(), 2);

    let opener = MockMixerOpener::failing(mixer, 2);
    assert!(acquire_mixer(&opener).is_none());
    assert_eq!(opener.attempts(), 2);
}

#[test]
fn test_disabled_backend_never_opens() {
    let mut config = HushConfig::default();
    config.mixer.backend = MixerBackend::None;
    let opener = SystemMixerOpener::new(config.mixer);
    assert!(acquire_mixer(&opener).is_none());
}

// ── Config ──────────────────────────────────────────────────────────────

#[test]
fn test_config_file_layers_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hush.toml");
    std::fs::write(
        &path,
        "settings_path = \"/tmp/hush-settings.json\"\n[mixer]\nbackend = \"pipewire\"\n",
    )
    .unwrap();

    let config = load_config(Some(path.as_path()), None).unwrap();
    assert_eq!(config.mixer.backend, MixerBackend::Pipewire);
    assert_eq!(config.mixer.control, "Master");
    assert_eq!(
        config.settings_path(),
        std::path::PathBuf::from("/tmp/hush-settings.json")
    );
}

// ── Scheduler and bus together ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_scheduled_event_reaches_host_loop() {
    let now = Local.with_ymd_and_hms(2025, 1, 15, 21, 59, 0).unwrap();
    let clock = Arc::new(SimulatedClock::new(now));
    let (mut scheduler, mut rx) = DailyScheduler::new(clock);
    scheduler
        .schedule_repeating(
            "quiet_hours:quiet_hours_on",
            now + chrono::Duration::minutes(1),
            hush_core::scheduler::daily(),
        )
        .unwrap();

    let bus = EventBus::default();
    let mut sub = bus.subscribe();

    let fired = rx.recv().await.unwrap();
    assert_eq!(fired.name, "quiet_hours:quiet_hours_on");
    bus.emit(BusMessage::new("host.fired", json!({ "name": fired.name })));

    let seen = sub.recv().await.unwrap();
    assert_eq!(seen.data["name"], json!("quiet_hours:quiet_hours_on"));
}
