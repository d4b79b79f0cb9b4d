//! End-to-end scenarios for the Quiet Hours skill, driven through the
//! plugin manager the way the host drives it.

use chrono::{DateTime, Duration, Local, TimeZone};
use hush_core::bus::{BusMessage, EventBus};
use hush_core::clock::FixedClock;
use hush_core::error::MixerError;
use hush_core::mixer::{Mixer, MixerOpener, MockMixer, MockMixerOpener};
use hush_core::scheduler::{ManualScheduler, Scheduler, daily};
use hush_core::settings::SettingsStore;
use hush_core::speech::{DialogRenderer, MockSpeechOutput, Speech};
use hush_plugins::quiet_hours::{
    MYCROFT_QUERY_EVENT, OFF_EVENT_NAME, ON_EVENT_NAME, QUERY_EVENT, SKILL_NAME,
};
use hush_plugins::{PluginManager, QuietHoursSkill};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn at(h: u32, m: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 1, 15, h, m, 0).unwrap()
}

fn qualified(event: &str) -> String {
    format!("{}:{}", SKILL_NAME, event)
}

fn enabled_settings() -> SettingsStore {
    let mut settings = SettingsStore::new();
    settings.set("enabled", true);
    settings.set("start_time_hour", 22);
    settings.set("start_time_min", 0);
    settings.set("end_time_hour", 8);
    settings.set("end_time_min", 0);
    settings.set("set_volume_to", 0);
    settings
}

struct Host {
    manager: PluginManager,
    scheduler: Arc<Mutex<ManualScheduler>>,
    mixer: MockMixer,
    clock: FixedClock,
    spoken: MockSpeechOutput,
    bus: EventBus,
}

impl Host {
    fn new(volume: u8, now: DateTime<Local>) -> Self {
        let scheduler = Arc::new(Mutex::new(ManualScheduler::new()));
        let spoken = MockSpeechOutput::new();
        let bus = EventBus::default();
        let speech = Speech::new(DialogRenderer::builtin(), Box::new(spoken.clone()));
        Self {
            manager: PluginManager::new(Box::new(scheduler.clone()), speech, bus.clone()),
            scheduler,
            mixer: MockMixer::new(volume),
            clock: FixedClock::new(now),
            spoken,
            bus,
        }
    }

    /// Load the skill with an opener that fails `failures` times first.
    fn load(&mut self, settings: SettingsStore, failures: usize) -> Arc<MockMixerOpener> {
        let opener = Arc::new(MockMixerOpener::failing(self.mixer.clone(), failures));
        let skill = QuietHoursSkill::new(
            Box::new(SharedOpener(opener.clone())),
            Arc::new(self.clock.clone()),
        );
        self.manager
            .load_with_settings(Box::new(skill), settings)
            .unwrap();
        opener
    }

    /// Move the clock and dispatch whatever became due.
    fn advance_to(&mut self, to: DateTime<Local>) {
        self.clock.set(to);
        let due = self.scheduler.lock().unwrap().due(to);
        for name in due {
            assert!(self.manager.dispatch_scheduled(&name).unwrap());
        }
    }

    fn setting(&self, key: &str) -> Option<Value> {
        self.manager
            .settings(SKILL_NAME)
            .and_then(|s| s.get(key).cloned())
    }

    fn active(&self) -> bool {
        self.setting("active") == Some(json!(true))
    }

    fn say(&mut self, utterance: &str) -> Option<String> {
        self.manager
            .handle_utterance(utterance)
            .unwrap()
            .map(|m| m.intent)
    }
}

/// Lets a test keep a handle on the opener it gave away.
struct SharedOpener(Arc<MockMixerOpener>);

impl MixerOpener for SharedOpener {
    fn open(&self) -> Result<Box<dyn Mixer>, MixerError> {
        self.0.open()
    }
}

// ── Window scenarios ────────────────────────────────────────────────

#[test]
fn test_load_at_2300_mutes() {
    let mut host = Host::new(65, at(23, 0));
    host.load(enabled_settings(), 0);

    assert!(host.active());
    assert_eq!(host.mixer.level(), 0);
    assert_eq!(
        host.spoken.utterances()[0],
        "Quiet hours are now in effect."
    );
}

#[test]
fn test_load_at_0900_stays_off() {
    let mut host = Host::new(65, at(9, 0));
    host.load(enabled_settings(), 0);

    assert!(!host.active());
    assert_eq!(host.mixer.level(), 65);
    assert!(host.mixer.history().is_empty());
    assert!(host.spoken.spoken().is_empty());
}

#[test]
fn test_load_at_0900_while_marked_active_restores() {
    let mut host = Host::new(65, at(9, 0));
    let mut settings = enabled_settings();
    settings.set("active", true);
    host.load(settings, 0);

    // Marked active but outside the window: the off path runs.
    assert!(!host.active());
    assert_eq!(host.spoken.utterances(), vec!["Quiet hours are over."]);
}

#[test]
fn test_full_night_cycle_restores_exact_volume() {
    let mut host = Host::new(73, at(12, 0));
    host.load(enabled_settings(), 0);
    assert!(!host.active());

    host.advance_to(at(22, 0));
    assert!(host.active());
    assert_eq!(host.mixer.level(), 0);

    host.advance_to(at(8, 0) + Duration::days(1));
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 73);
    assert_eq!(host.mixer.history(), vec![0, 73]);

    // The events keep repeating daily.
    host.advance_to(at(22, 0) + Duration::days(1));
    assert!(host.active());
}

#[test]
fn test_volume_changed_during_day_is_remembered() {
    let mut host = Host::new(73, at(12, 0));
    host.load(enabled_settings(), 0);

    host.mixer.nudge(35);
    host.advance_to(at(22, 0));
    host.advance_to(at(8, 0) + Duration::days(1));
    assert_eq!(host.mixer.level(), 35);
}

// ── Re-initialization ───────────────────────────────────────────────

#[test]
fn test_reinit_registers_exactly_two_daily_events() {
    let mut host = Host::new(50, at(12, 0));
    host.load(enabled_settings(), 0);

    {
        let scheduler = host.scheduler.lock().unwrap();
        assert_eq!(
            scheduler.names(),
            vec![qualified(OFF_EVENT_NAME), qualified(ON_EVENT_NAME)]
        );
        assert_eq!(scheduler.interval(&qualified(ON_EVENT_NAME)), Some(daily()));
        assert_eq!(
            scheduler.next_fire(&qualified(ON_EVENT_NAME)),
            Some(at(22, 0))
        );
        assert_eq!(
            scheduler.next_fire(&qualified(OFF_EVENT_NAME)),
            Some(at(8, 0) + Duration::days(1))
        );
    }

    host.manager
        .update_setting(SKILL_NAME, "start_time_hour", json!(21))
        .unwrap();

    let scheduler = host.scheduler.lock().unwrap();
    assert_eq!(scheduler.len(), 2);
    assert_eq!(
        scheduler.next_fire(&qualified(ON_EVENT_NAME)),
        Some(at(21, 0))
    );
    // Every registration cancelled the previous one first.
    assert_eq!(
        scheduler.cancelled_log(),
        &[qualified(ON_EVENT_NAME), qualified(OFF_EVENT_NAME)]
    );
}

#[test]
fn test_settings_change_clamps_volume() {
    let mut host = Host::new(50, at(12, 0));
    host.load(enabled_settings(), 0);

    host.manager
        .update_setting(SKILL_NAME, "set_volume_to", json!(150))
        .unwrap();
    assert_eq!(host.setting("set_volume_to"), Some(json!(100)));

    host.manager
        .update_setting(SKILL_NAME, "set_volume_to", json!(-5))
        .unwrap();
    assert_eq!(host.setting("set_volume_to"), Some(json!(0)));
}

#[test]
fn test_disable_while_active_restores() {
    let mut host = Host::new(80, at(23, 0));
    host.load(enabled_settings(), 0);
    assert!(host.active());

    host.manager
        .update_setting(SKILL_NAME, "enabled", json!(false))
        .unwrap();
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 80);
    assert!(host.scheduler.lock().unwrap().is_empty());
}

// ── Mixer acquisition ───────────────────────────────────────────────

#[test]
fn test_mixer_retry_once_succeeds() {
    let mut host = Host::new(60, at(23, 0));
    let opener = host.load(enabled_settings(), 1);

    assert_eq!(opener.attempts(), 2);
    assert!(host.active());
    assert_eq!(host.mixer.level(), 0);
}

#[test]
fn test_mixer_unavailable_makes_toggles_noops() {
    let mut host = Host::new(60, at(23, 0));
    let opener = host.load(enabled_settings(), 2);

    assert_eq!(opener.attempts(), 2);
    assert!(!host.active());
    assert!(host.mixer.history().is_empty());

    host.advance_to(at(22, 0) + Duration::days(1));
    host.advance_to(at(8, 0) + Duration::days(2));
    assert!(host.mixer.history().is_empty());
    assert_eq!(opener.attempts(), 2);
}

// ── Intents ─────────────────────────────────────────────────────────

#[test]
fn test_enable_and_disable_intents() {
    let mut host = Host::new(50, at(23, 0));
    host.load(SettingsStore::new(), 0);
    assert_eq!(host.setting("enabled"), Some(json!(false)));

    assert_eq!(host.say("Disable quiet hours").as_deref(), Some("disable"));
    assert_eq!(host.spoken.utterances().last().unwrap(), "Quiet hours are already disabled.");

    assert_eq!(host.say("please enable quiet hours").as_deref(), Some("enable"));
    assert_eq!(host.setting("enabled"), Some(json!(true)));
    // Enabling inside the window mutes right away.
    assert!(host.active());
    assert_eq!(host.mixer.level(), 0);

    assert_eq!(host.say("enable quiet hours").as_deref(), Some("enable"));
    assert_eq!(host.spoken.utterances().last().unwrap(), "Quiet hours are already enabled.");

    assert_eq!(host.say("disable quiet hours").as_deref(), Some("disable"));
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 50);
}

#[test]
fn test_activate_and_deactivate_intents() {
    let mut host = Host::new(50, at(12, 0));
    host.load(SettingsStore::new(), 0);

    host.say("turn on quiet hours");
    assert_eq!(host.spoken.utterances(), vec!["Quiet hours are disabled. Enable them first."]);
    assert!(!host.active());

    host.manager
        .update_setting(SKILL_NAME, "enabled", json!(true))
        .unwrap();
    assert_eq!(host.say("activate quiet hours").as_deref(), Some("activate"));
    assert!(host.active());
    assert_eq!(host.say("deactivate quiet hours").as_deref(), Some("deactivate"));
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 50);

    assert_eq!(host.say("what time is it"), None);
}

// ── Bus query ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_bus_query_reports_active_flag() {
    let mut host = Host::new(50, at(23, 0));
    host.load(enabled_settings(), 0);
    let mut rx = host.bus.subscribe();

    let query = BusMessage::new(QUERY_EVENT, Value::Null);
    assert_eq!(host.manager.dispatch_event(&query).unwrap(), 1);

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.msg_type, "quiet_hours.query.response");
    assert!(reply.is_response_to(&query));
    assert_eq!(reply.data, json!({"quiet_hours_on": true}));

    let unrelated = BusMessage::new("weather.query", Value::Null);
    assert_eq!(host.manager.dispatch_event(&unrelated).unwrap(), 0);
}

#[tokio::test]
async fn test_mycroft_query_name_answered() {
    let mut host = Host::new(50, at(12, 0));
    host.load(enabled_settings(), 0);
    let mut rx = host.bus.subscribe();

    let query = BusMessage::new(MYCROFT_QUERY_EVENT, Value::Null);
    assert_eq!(host.manager.dispatch_event(&query).unwrap(), 1);

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply.msg_type, "private.mycroftai.quiet_hours.response");
    assert!(reply.is_response_to(&query));
    assert_eq!(reply.data, json!({"quiet_hours_on": false}));
}

// ── Persistence ─────────────────────────────────────────────────────

#[test]
fn test_active_flag_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut seeded = SettingsStore::load(&path);
    for (key, value) in enabled_settings().values() {
        seeded.set(key, value.clone());
    }
    seeded.save().unwrap();

    let mut host = Host::new(70, at(23, 0));
    host.load(SettingsStore::load(&path), 0);
    assert!(host.active());
    host.manager.shutdown_all();

    let persisted = SettingsStore::load(&path);
    assert!(persisted.get_bool("active"));
    assert_eq!(persisted.get_i64("saved_volume"), Some(70));
    assert!(host.scheduler.lock().unwrap().is_empty());

    // Restarted in the morning while still muted: the persisted baseline
    // is restored and then dropped.
    let mut host = Host::new(0, at(9, 0));
    host.load(SettingsStore::load(&path), 0);
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 70);
    assert_eq!(host.setting("saved_volume"), None);
}

#[test]
fn test_restart_inside_window_keeps_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut host = Host::new(55, at(22, 30));
    host.load(SettingsStore::load(&path), 0);
    host.say("enable quiet hours");
    assert!(host.active());
    host.manager.shutdown_all();

    // Back up at 23:30 with the device still muted.
    let mut host = Host::new(0, at(23, 30));
    host.load(SettingsStore::load(&path), 0);
    assert!(host.active());
    assert_eq!(host.mixer.level(), 0);

    host.advance_to(at(8, 0) + Duration::days(1));
    assert!(!host.active());
    assert_eq!(host.mixer.level(), 55);
}

#[test]
fn test_restart_while_muted_without_baseline_only_clears_flag() {
    let mut host = Host::new(0, at(9, 0));
    let mut settings = enabled_settings();
    settings.set("active", true);
    host.load(settings, 0);
    assert!(!host.active());
    assert!(host.mixer.history().is_empty());
}
