//! Wall-clock source, injectable so time-dependent logic can be tested.

use chrono::{DateTime, Duration, Local};
use std::sync::{Arc, Mutex};

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A wall clock that runs with tokio's timer from a starting time, so it
/// advances under paused-time tests. `set` and `advance` step it the way
/// an NTP correction or a resume from suspend would.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    anchor: Arc<Mutex<(DateTime<Local>, tokio::time::Instant)>>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            anchor: Arc::new(Mutex::new((start, tokio::time::Instant::now()))),
        }
    }

    /// Jump to `now`; time keeps running from there.
    pub fn set(&self, now: DateTime<Local>) {
        *self.anchor.lock().unwrap_or_else(|p| p.into_inner()) = (now, tokio::time::Instant::now());
    }

    pub fn advance(&self, by: Duration) {
        self.set(self.now() + by);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Local> {
        let (wall, mono) = *self.anchor.lock().unwrap_or_else(|p| p.into_inner());
        wall + Duration::from_std(mono.elapsed()).unwrap_or_else(|_| Duration::zero())
    }
}
