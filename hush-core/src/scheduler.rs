//! Named repeating callbacks. This is the scheduler skills register against.
//!
//! A scheduler does not call back into skills itself. When a registration
//! fires, its name is handed to the host loop, which dispatches it to the
//! owning skill on the host's single task.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::SchedulerError;

/// Seconds in a day, the repeat interval for quiet hours boundaries.
pub const DAILY_SECS: i64 = 86_400;

/// Longest a timer sleeps before re-reading the wall clock.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

/// One day as a `Duration`.
pub fn daily() -> Duration {
    Duration::seconds(DAILY_SECS)
}

/// A registration that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub name: String,
    pub fired_at: DateTime<Local>,
}

/// Register and cancel named repeating callbacks.
pub trait Scheduler: Send {
    /// Fire `name` at `first` and every `every` after. Replaces a live
    /// registration with the same name.
    fn schedule_repeating(
        &mut self,
        name: &str,
        first: DateTime<Local>,
        every: Duration,
    ) -> Result<(), SchedulerError>;

    /// Cancel a registration. Returns whether one existed.
    fn cancel(&mut self, name: &str) -> bool;

    fn is_scheduled(&self, name: &str) -> bool;

    /// Next time `name` will fire, if registered.
    fn next_fire(&self, name: &str) -> Option<DateTime<Local>>;
}

fn validate_interval(name: &str, every: Duration) -> Result<(), SchedulerError> {
    if every <= Duration::zero() {
        return Err(SchedulerError::InvalidInterval {
            name: name.to_string(),
            message: format!("{}s is not positive", every.num_seconds()),
        });
    }
    every.to_std().map(|_| ()).map_err(|e| SchedulerError::InvalidInterval {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// First occurrence of `first + k * every` that is at or after `now`.
fn next_occurrence(
    first: DateTime<Local>,
    every: Duration,
    now: DateTime<Local>,
) -> DateTime<Local> {
    if first >= now {
        return first;
    }
    let every_ms = every.num_milliseconds().max(1);
    let behind_ms = (now - first).num_milliseconds();
    let periods = (behind_ms + every_ms - 1) / every_ms;
    first + Duration::milliseconds(periods * every_ms)
}

#[derive(Debug, Clone)]
struct Registration {
    first: DateTime<Local>,
    every: Duration,
}

// ── Tokio-backed scheduler ─────────────────────────────────────────

/// Runs each registration as a tokio task with its own cancel token. Each
/// task follows the wall clock: it sleeps in steps of at most a minute and
/// fires once `Clock::now()` reaches the target.
pub struct DailyScheduler {
    tx: mpsc::UnboundedSender<ScheduledEvent>,
    entries: HashMap<String, (Registration, CancellationToken)>,
    clock: Arc<dyn Clock>,
}

impl DailyScheduler {
    /// Create a scheduler and the receiver the host loop reads fired events from.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<ScheduledEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                entries: HashMap::new(),
                clock,
            },
            rx,
        )
    }

    /// Cancel every registration.
    pub fn cancel_all(&mut self) {
        for (_, (_, token)) in self.entries.drain() {
            token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Scheduler for DailyScheduler {
    fn schedule_repeating(
        &mut self,
        name: &str,
        first: DateTime<Local>,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        validate_interval(name, every)?;
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SchedulerError::NoRuntime {
                name: name.to_string(),
            }
        })?;
        self.cancel(name);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let clock = Arc::clone(&self.clock);
        let event_name = name.to_string();

        handle.spawn(async move {
            let mut target = first;
            loop {
                let now = clock.now();
                if now >= target {
                    trace!("Scheduled event '{}' fired", event_name);
                    let event = ScheduledEvent {
                        name: event_name.clone(),
                        fired_at: now,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                    // Missed occurrences (suspend, clock step) collapse into one fire.
                    target = next_occurrence(first, every, now + Duration::milliseconds(1));
                    continue;
                }
                // Re-read the wall clock at least once a minute.
                let wait = (target - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO)
                    .min(MAX_SLEEP);
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        });

        debug!(
            "Scheduled '{}' at {} every {}s",
            name,
            first.format("%Y-%m-%d %H:%M"),
            every.num_seconds()
        );
        self.entries
            .insert(name.to_string(), (Registration { first, every }, token));
        Ok(())
    }

    fn cancel(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some((_, token)) => {
                token.cancel();
                debug!("Cancelled scheduled event '{}'", name);
                true
            }
            None => false,
        }
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn next_fire(&self, name: &str) -> Option<DateTime<Local>> {
        self.entries
            .get(name)
            .map(|(reg, _)| next_occurrence(reg.first, reg.every, self.clock.now()))
    }
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

// ── Manual scheduler ────────────────────────────────────────────────

/// A scheduler driven by explicit time, for tests and dry runs.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    entries: HashMap<String, (Registration, DateTime<Local>)>,
    scheduled_log: Vec<String>,
    cancelled_log: Vec<String>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names whose next fire time is at or before `now`, earliest first.
    /// Each fired registration moves to its next occurrence after `now`.
    pub fn due(&mut self, now: DateTime<Local>) -> Vec<String> {
        let mut fired: Vec<(DateTime<Local>, String)> = Vec::new();
        for (name, (reg, next)) in self.entries.iter_mut() {
            if *next <= now {
                fired.push((*next, name.clone()));
                *next = next_occurrence(reg.first, reg.every, now + Duration::milliseconds(1));
            }
        }
        fired.sort();
        fired.into_iter().map(|(_, name)| name).collect()
    }

    /// Every name passed to `schedule_repeating`, in call order.
    pub fn scheduled_log(&self) -> &[String] {
        &self.scheduled_log
    }

    /// Every name that was cancelled while registered, in call order.
    pub fn cancelled_log(&self) -> &[String] {
        &self.cancelled_log
    }

    /// Currently registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Repeat interval of a registration.
    pub fn interval(&self, name: &str) -> Option<Duration> {
        self.entries.get(name).map(|(reg, _)| reg.every)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(
        &mut self,
        name: &str,
        first: DateTime<Local>,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        validate_interval(name, every)?;
        self.scheduled_log.push(name.to_string());
        self.entries
            .insert(name.to_string(), (Registration { first, every }, first));
        Ok(())
    }

    fn cancel(&mut self, name: &str) -> bool {
        if self.entries.remove(name).is_some() {
            self.cancelled_log.push(name.to_string());
            true
        } else {
            false
        }
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn next_fire(&self, name: &str) -> Option<DateTime<Local>> {
        self.entries.get(name).map(|(_, next)| *next)
    }
}

// ── Shared handle ───────────────────────────────────────────────────

/// A scheduler behind a shared lock, so one party can drive it while
/// another registers against it.
impl<S: Scheduler> Scheduler for Arc<Mutex<S>> {
    fn schedule_repeating(
        &mut self,
        name: &str,
        first: DateTime<Local>,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        self.lock()
            .unwrap_or_else(|p| p.into_inner())
            .schedule_repeating(name, first, every)
    }

    fn cancel(&mut self, name: &str) -> bool {
        self.lock().unwrap_or_else(|p| p.into_inner()).cancel(name)
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.lock().unwrap_or_else(|p| p.into_inner()).is_scheduled(name)
    }

    fn next_fire(&self, name: &str) -> Option<DateTime<Local>> {
        self.lock().unwrap_or_else(|p| p.into_inner()).next_fire(name)
    }
}
