//! Host run loop. Owns the scheduler, bus and plugin manager, and
//! dispatches every callback from a single task.

use hush_core::bus::{BusMessage, EventBus};
use hush_core::clock::{Clock, SystemClock};
use hush_core::config::HushConfig;
use hush_core::mixer::SystemMixerOpener;
use hush_core::scheduler::DailyScheduler;
use hush_core::settings::SettingsStore;
use hush_core::speech::Speech;
use hush_plugins::quiet_hours::QUERY_EVENT;
use hush_plugins::{PluginManager, QuietHoursSkill};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// What the loop should do after a line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Continue,
    Quit,
}

const HELP: &str = "\
Type an utterance (e.g. \"enable quiet hours\") or a command:
  /status   ask the skill whether quiet hours are in effect
  /reload   re-read the settings file
  /help     show this help
  /quit     stop the host";

/// Run the host until stdin asks to quit, Ctrl-C, or the bus closes.
pub async fn run(config: HushConfig) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (scheduler, mut fired) = DailyScheduler::new(Arc::clone(&clock));
    let bus = EventBus::default();
    let mut bus_rx = bus.subscribe();
    let speech = Speech::from_config(&config.speech);
    info!(
        "Starting host (mixer: {}, speech: {})",
        config.mixer.backend,
        speech.output_name()
    );

    let mut manager = PluginManager::new(Box::new(scheduler), speech, bus);
    let settings_path = config.settings_path();
    let skill = QuietHoursSkill::new(Box::new(SystemMixerOpener::new(config.mixer.clone())), clock);
    manager.load_with_settings(Box::new(skill), SettingsStore::load(&settings_path))?;
    info!("Settings file: {}", settings_path.display());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut hangup = Hangup::new()?;

    loop {
        tokio::select! {
            Some(event) = fired.recv() => {
                debug!("Scheduled event '{}' fired at {}", event.name, event.fired_at);
                if let Err(e) = manager.dispatch_scheduled(&event.name) {
                    warn!("Scheduled event '{}' failed: {}", event.name, e);
                }
            }
            received = bus_rx.recv() => match received {
                Ok(message) => handle_bus_message(&mut manager, &message),
                Err(RecvError::Lagged(skipped)) => warn!("Host fell behind the bus by {} messages", skipped),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if handle_line(&mut manager, &line) == HostAction::Quit {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading settings");
                manager.reload_all_settings();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    manager.shutdown_all();
    info!("Host stopped");
    Ok(())
}

/// Print responses, offer everything else to the plugins.
pub fn handle_bus_message(manager: &mut PluginManager, message: &BusMessage) {
    if message.reply_to.is_some() {
        println!("{}", describe_response(message));
        return;
    }
    match manager.dispatch_event(message) {
        Ok(0) => debug!("No plugin handled '{}'", message.msg_type),
        Ok(n) => debug!("'{}' handled by {} plugin(s)", message.msg_type, n),
        Err(e) => warn!("Handling '{}' failed: {}", message.msg_type, e),
    }
}

fn describe_response(message: &BusMessage) -> String {
    match message.data.get("quiet_hours_on").and_then(Value::as_bool) {
        Some(true) => "Quiet hours are in effect.".to_string(),
        Some(false) => "Quiet hours are not in effect.".to_string(),
        None => format!("{}: {}", message.msg_type, message.data),
    }
}

/// Handle one line of stdin: a `/command` or an utterance.
pub fn handle_line(manager: &mut PluginManager, line: &str) -> HostAction {
    let line = line.trim();
    if line.is_empty() {
        return HostAction::Continue;
    }

    if let Some(command) = line.strip_prefix('/') {
        match command {
            "quit" | "exit" => return HostAction::Quit,
            "status" => {
                let query = BusMessage::new(QUERY_EVENT, Value::Null).with_context("source", "cli");
                manager.bus().emit(query);
            }
            "reload" => manager.reload_all_settings(),
            "help" => println!("{}", HELP),
            other => println!("Unknown command '/{}'. Try /help.", other),
        }
        return HostAction::Continue;
    }

    match manager.handle_utterance(line) {
        Ok(Some(matched)) => debug!("Handled intent '{}:{}'", matched.plugin, matched.intent),
        Ok(None) => println!("Sorry, I didn't understand that."),
        Err(e) => warn!("Intent handling failed: {}", e),
    }
    HostAction::Continue
}

/// SIGHUP listener. Never fires off Unix.
#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
