//! Quiet hours window: the next start and end boundaries and containment.

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::settings::QuietHoursSettings;

/// The next occurrence of each boundary, both at or after the instant
/// they were computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl QuietWindow {
    /// Whether quiet hours should be in effect at `now`.
    pub fn contains(&self, now: DateTime<Local>) -> bool {
        should_turn_on_now(self.start, self.end, now)
    }
}

/// Today's `hour:minute` (seconds zeroed) in local time, rolled forward a
/// day if it is not after `now`.
pub fn next_boundary(hour: u32, minute: u32, now: DateTime<Local>) -> DateTime<Local> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut candidate = local_at(now.date_naive().and_time(time), now);
    if candidate <= now {
        candidate = local_at((now.date_naive() + Duration::days(1)).and_time(time), now);
    }
    candidate
}

/// Resolve a local wall time. Ambiguous times take the earlier instant,
/// times skipped by a DST jump move forward an hour.
fn local_at(naive: chrono::NaiveDateTime, fallback: DateTime<Local>) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or(fallback)
}

/// Compute the window from settings as seen at `now`.
pub fn compute_window(settings: &QuietHoursSettings, now: DateTime<Local>) -> QuietWindow {
    QuietWindow {
        start: next_boundary(settings.start_hour, settings.start_min, now),
        end: next_boundary(settings.end_hour, settings.end_min, now),
    }
}

/// `now` in `[start, end)` when `start <= end`; otherwise the window wraps
/// and `now` must be after `start` or before `end`.
pub fn should_turn_on_now(
    start: DateTime<Local>,
    end: DateTime<Local>,
    now: DateTime<Local>,
) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now > start || now < end
    }
}
