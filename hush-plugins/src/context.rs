//! What the host lends a skill for the duration of one callback.

use chrono::{DateTime, Duration, Local};
use hush_core::bus::EventBus;
use hush_core::error::SchedulerError;
use hush_core::scheduler::Scheduler;
use hush_core::settings::SettingsStore;
use hush_core::speech::Speech;

/// Host services for one skill callback.
pub struct SkillContext<'a> {
    /// The skill's own settings, mutated in place.
    pub settings: &'a mut SettingsStore,
    /// Scheduler handle that namespaces event names with the skill name.
    pub scheduler: SkillScheduler<'a>,
    pub speech: &'a Speech,
    pub bus: &'a EventBus,
}

impl<'a> SkillContext<'a> {
    pub fn new(
        skill: &'a str,
        settings: &'a mut SettingsStore,
        scheduler: &'a mut dyn Scheduler,
        speech: &'a Speech,
        bus: &'a EventBus,
    ) -> Self {
        Self {
            settings,
            scheduler: SkillScheduler::new(skill, scheduler),
            speech,
            bus,
        }
    }
}

/// Scheduler handle scoped to one skill: event `x` is registered as `<skill>:x`.
pub struct SkillScheduler<'a> {
    skill: &'a str,
    inner: &'a mut dyn Scheduler,
}

impl<'a> SkillScheduler<'a> {
    pub fn new(skill: &'a str, inner: &'a mut dyn Scheduler) -> Self {
        Self { skill, inner }
    }

    /// Full host-side name of one of this skill's events.
    pub fn qualified(&self, event: &str) -> String {
        format!("{}:{}", self.skill, event)
    }

    pub fn schedule_repeating(
        &mut self,
        event: &str,
        first: DateTime<Local>,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        let name = self.qualified(event);
        self.inner.schedule_repeating(&name, first, every)
    }

    pub fn cancel(&mut self, event: &str) -> bool {
        let name = self.qualified(event);
        self.inner.cancel(&name)
    }

    pub fn is_scheduled(&self, event: &str) -> bool {
        self.inner.is_scheduled(&self.qualified(event))
    }

    pub fn next_fire(&self, event: &str) -> Option<DateTime<Local>> {
        self.inner.next_fire(&self.qualified(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hush_core::scheduler::{ManualScheduler, daily};

    #[test]
    fn test_skill_scheduler_namespaces_names() {
        let mut manual = ManualScheduler::new();
        let first = Local.with_ymd_and_hms(2025, 1, 15, 22, 0, 0).unwrap();
        {
            let mut scheduler = SkillScheduler::new("quiet_hours", &mut manual);
            scheduler
                .schedule_repeating("quiet_hours_on", first, daily())
                .unwrap();
            assert!(scheduler.is_scheduled("quiet_hours_on"));
            assert_eq!(scheduler.next_fire("quiet_hours_on"), Some(first));
        }
        assert_eq!(manual.names(), vec!["quiet_hours:quiet_hours_on"]);

        let mut scheduler = SkillScheduler::new("quiet_hours", &mut manual);
        assert!(scheduler.cancel("quiet_hours_on"));
        assert!(!scheduler.cancel("quiet_hours_on"));
    }
}
