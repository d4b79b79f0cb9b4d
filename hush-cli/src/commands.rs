//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::SettingsAction;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use hush_core::config::HushConfig;
use hush_core::settings::SettingsStore;
use hush_plugins::quiet_hours::{QuietHoursSettings, compute_window};
use serde_json::Value;
use std::path::Path;

/// Handle a CLI subcommand other than `run`.
pub fn handle_command(command: Commands, config: &HushConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run => Err(anyhow::anyhow!("`run` is handled by the host loop")),
        Commands::Settings { action } => handle_settings(action, &config.settings_path()),
        Commands::Window { at } => handle_window(at.as_deref(), &config.settings_path()),
        Commands::Config { action } => handle_config(action, config),
    }
}

fn handle_settings(action: SettingsAction, path: &Path) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => {
            let store = SettingsStore::load(path);
            println!("Settings file: {}", path.display());
            if store.is_empty() {
                println!("(no settings stored yet; defaults apply)");
            } else {
                println!("{}", serde_json::to_string_pretty(store.values())?);
            }
            Ok(())
        }
        SettingsAction::Set { key, value } => {
            let value = set_setting(path, &key, &value)?;
            println!("Set {} = {} in {}", key, value, path.display());
            println!("A running host picks this up on /reload or SIGHUP.");
            Ok(())
        }
    }
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_setting(path: &Path, key: &str, raw: &str) -> anyhow::Result<Value> {
    let mut store = SettingsStore::load(path);
    let value = parse_value(raw);
    store.set(key, value.clone());
    store.save()?;
    Ok(value)
}

/// Parse `HH:MM` as that time on `date` in local time.
fn parse_at(raw: &str, date: NaiveDate) -> anyhow::Result<DateTime<Local>> {
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("Invalid time '{}' (expected HH:MM): {}", raw, e))?;
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("{} does not exist today in local time", raw))
}

fn describe_window(settings: &QuietHoursSettings, now: DateTime<Local>) -> String {
    let window = compute_window(settings, now);
    let mut out = String::new();
    out.push_str(&format!(
        "Quiet hours: {:02}:{:02} -> {:02}:{:02} ({})\n",
        settings.start_hour,
        settings.start_min,
        settings.end_hour,
        settings.end_min,
        if settings.enabled { "enabled" } else { "disabled" }
    ));
    out.push_str(&format!("Evaluated at: {}\n", now.format("%Y-%m-%d %H:%M")));
    out.push_str(&format!("Next start:   {}\n", window.start.format("%Y-%m-%d %H:%M")));
    out.push_str(&format!("Next end:     {}\n", window.end.format("%Y-%m-%d %H:%M")));
    out.push_str(&format!(
        "In window:    {}\n",
        if window.contains(now) { "yes" } else { "no" }
    ));
    out.push_str(&format!("Muted level:  {}", settings.set_volume_to));
    out
}

fn handle_window(at: Option<&str>, path: &Path) -> anyhow::Result<()> {
    let now = match at {
        Some(raw) => parse_at(raw, Local::now().date_naive())?,
        None => Local::now(),
    };
    let settings = QuietHoursSettings::from_store(&SettingsStore::load(path));
    println!("{}", describe_window(&settings, now));
    Ok(())
}

/// Write the default config to `path` unless a file is already there.
/// Returns whether a file was written.
fn init_config_at(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(&HushConfig::default())?;
    std::fs::write(path, toml_str)?;
    Ok(true)
}

fn handle_config(action: ConfigAction, config: &HushConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = hush_core::config::project_dirs()
                .map(|d| d.config_dir().join("config.toml"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine the user config directory"))?;
            if init_config_at(&config_path)? {
                println!(
                    "Created default configuration at: {}",
                    config_path.display()
                );
            } else {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            println!("# settings file: {}", config.settings_path().display());
            Ok(())
        }
    }
}
