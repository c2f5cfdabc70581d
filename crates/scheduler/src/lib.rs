//! Snapshot schedule handling: raw Task Scheduler triggers, their normalized
//! [`ScheduleRule`] form, the trigger diff engine, and the seam to the OS
//! scheduling service.

use thiserror::Error;
use tracing::{debug, info, warn};
use vss_core::{Schedule, ScheduleRule, StartDate};

mod diff;
pub mod mock;
mod trigger;

pub use diff::{diff, TriggerDiff};
pub use trigger::*;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduled task `{0}` not found")]
    TaskNotFound(String),
    #[error("task scheduler unavailable: {0}")]
    Unavailable(String),
    #[error("trigger {index} could not be read: {reason}")]
    TriggerRead { index: usize, reason: String },
    #[error("{operation} failed: {reason}")]
    Operation {
        operation: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Denormalize(#[from] DenormalizeError),
}

pub trait TaskScheduler {
    type Task: ScheduledTask;

    fn activate(&self, task_name: &str) -> Result<Self::Task, SchedulerError>;
}

/// One activated scheduled task. Triggers are addressed by position; new
/// triggers are appended, never written over an existing slot.
pub trait ScheduledTask {
    fn trigger_count(&self) -> Result<usize, SchedulerError>;
    fn trigger(&self, index: usize) -> Result<RawTrigger, SchedulerError>;
    fn delete_trigger(&mut self, index: usize) -> Result<(), SchedulerError>;
    fn append_trigger(&mut self, trigger: &RawTrigger) -> Result<(), SchedulerError>;
    fn save(&mut self) -> Result<(), SchedulerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub deleted: usize,
    pub created: usize,
}

/// An activated task and its decoded rules, scoped to exactly one task name.
///
/// The rules are read once and reused until the task is modified.
pub struct TaskContext<T: ScheduledTask> {
    name: String,
    task: T,
    rules: Option<Vec<ScheduleRule>>,
}

impl<T: ScheduledTask> TaskContext<T> {
    pub fn activate<S>(scheduler: &S, task_name: &str) -> Result<Self, SchedulerError>
    where
        S: TaskScheduler<Task = T>,
    {
        let task = scheduler.activate(task_name)?;
        Ok(Self {
            name: task_name.to_string(),
            task,
            rules: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&mut self) -> Result<&[ScheduleRule], SchedulerError> {
        if self.rules.is_none() {
            self.rules = Some(read_rules(&self.name, &self.task)?);
        }
        Ok(self.rules.as_deref().unwrap_or_default())
    }

    /// Deletes extra triggers highest index first, appends the missing ones,
    /// then saves the task.
    pub fn apply(&mut self, changes: &TriggerDiff, today: StartDate) -> Result<ApplyOutcome, SchedulerError> {
        if changes.is_empty() {
            return Ok(ApplyOutcome::default());
        }
        let payloads = changes
            .to_create
            .iter()
            .map(|rule| denormalize(rule, today))
            .collect::<Result<Vec<_>, _>>()?;

        self.rules = None;
        let mut outcome = ApplyOutcome::default();
        for index in changes.deletion_order() {
            self.task.delete_trigger(index)?;
            debug!(task = %self.name, index, "deleted trigger");
            outcome.deleted += 1;
        }
        for payload in &payloads {
            self.task.append_trigger(payload)?;
            outcome.created += 1;
        }
        self.task.save()?;
        info!(
            task = %self.name,
            deleted = outcome.deleted,
            created = outcome.created,
            "updated snapshot triggers"
        );
        Ok(outcome)
    }
}

fn read_rules<T: ScheduledTask>(name: &str, task: &T) -> Result<Vec<ScheduleRule>, SchedulerError> {
    let count = task.trigger_count()?;
    let mut rules = Vec::with_capacity(count);
    for index in 0..count {
        let raw = match task.trigger(index) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(task = %name, index, error = %err, "skipping unreadable trigger");
                continue;
            }
        };
        match normalize(&raw, index) {
            Ok(rule) => rules.push(rule),
            Err(err) => debug!(task = %name, index, error = %err, "skipping trigger"),
        }
    }
    Ok(rules)
}

/// Reads a task's rules, reporting `Schedule::Absent` when the task cannot be
/// activated or enumerated.
pub fn read_schedule<S: TaskScheduler>(scheduler: &S, task_name: &str) -> Schedule {
    let rules = TaskContext::activate(scheduler, task_name).and_then(|mut context| {
        let rules = context.rules()?.to_vec();
        Ok(rules)
    });
    match rules {
        Ok(rules) => Schedule::Rules(rules),
        Err(err) => {
            debug!(task = %task_name, error = %err, "no readable snapshot schedule");
            Schedule::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockScheduler;
    use super::*;
    use vss_core::{Recurrence, StartTime, Weekday};

    const TASK: &str = "ShadowCopyVolume{1234}.job";

    fn weekly_raw(days_of_week: u16) -> RawTrigger {
        RawTrigger {
            begin_year: 2024,
            begin_month: 1,
            begin_day: 1,
            start_hour: 2,
            trigger_type: TASK_TIME_TRIGGER_WEEKLY,
            data: TriggerData {
                weeks_interval: 1,
                days_of_week,
                ..TriggerData::default()
            },
            ..RawTrigger::default()
        }
    }

    fn today() -> StartDate {
        StartDate::from_ymd(2024, 1, 1).unwrap()
    }

    #[test]
    fn unreadable_and_unsupported_triggers_are_skipped() {
        let logon = RawTrigger {
            trigger_type: TASK_EVENT_TRIGGER_AT_LOGON,
            ..weekly_raw(0)
        };
        let scheduler = MockScheduler::new().with_task(TASK, vec![weekly_raw(0x02), logon]);
        scheduler.push_unreadable(TASK);
        scheduler.push_trigger(TASK, weekly_raw(0x20));

        let mut context = TaskContext::activate(&scheduler, TASK).unwrap();
        let rules = context.rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].index, Some(0));
        assert_eq!(rules[1].index, Some(3));
    }

    #[test]
    fn missing_task_reads_as_absent() {
        let scheduler = MockScheduler::new();
        assert_eq!(read_schedule(&scheduler, TASK), Schedule::Absent);
        assert_eq!(read_schedule(&MockScheduler::unavailable(), TASK), Schedule::Absent);
    }

    #[test]
    fn contexts_are_scoped_per_task_name() {
        let scheduler = MockScheduler::new()
            .with_task("ShadowCopyVolume{c}.job", vec![weekly_raw(0x02)])
            .with_task("ShadowCopyVolume{d}.job", vec![weekly_raw(0x20), weekly_raw(0x40)]);
        let c = read_schedule(&scheduler, "ShadowCopyVolume{c}.job");
        let d = read_schedule(&scheduler, "ShadowCopyVolume{d}.job");
        assert_eq!(c.rules().map(<[ScheduleRule]>::len), Some(1));
        assert_eq!(d.rules().map(<[ScheduleRule]>::len), Some(2));
    }

    #[test]
    fn apply_deletes_high_indices_first_then_appends() {
        let scheduler = MockScheduler::new().with_task(
            TASK,
            vec![weekly_raw(0x01), weekly_raw(0x02), weekly_raw(0x04), weekly_raw(0x08)],
        );
        let mut context = TaskContext::activate(&scheduler, TASK).unwrap();
        let desired = vec![
            ScheduleRule::new(Recurrence::Weekly {
                every: Some(1),
                days_of_week: Some([Weekday::Mon].into_iter().collect()),
            })
            .starting(Some(today()), StartTime::from_hm(2, 0).ok()),
            ScheduleRule::new(Recurrence::Daily { every: Some(1) })
                .starting(None, StartTime::from_hm(4, 30).ok()),
        ];
        let current = context.rules().unwrap().to_vec();
        let changes = diff(&current, &desired, false);
        assert_eq!(changes.to_delete, vec![0, 2, 3]);

        let outcome = context.apply(&changes, today()).unwrap();
        assert_eq!(outcome, ApplyOutcome { deleted: 3, created: 1 });

        let triggers = scheduler.triggers(TASK).unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].data.days_of_week, 0x02);
        assert_eq!(triggers[1].trigger_type, TASK_TIME_TRIGGER_DAILY);
        assert_eq!((triggers[1].start_hour, triggers[1].start_minute), (4, 30));
        assert_eq!(scheduler.save_count(TASK), 1);

        assert_eq!(context.rules().unwrap().len(), 2);
        assert!(diff(context.rules().unwrap(), &desired, false).is_empty());
    }

    #[test]
    fn invalid_creation_aborts_before_any_deletion() {
        let scheduler = MockScheduler::new().with_task(TASK, vec![weekly_raw(0x01)]);
        let mut context = TaskContext::activate(&scheduler, TASK).unwrap();
        let changes = TriggerDiff {
            to_delete: vec![0],
            to_create: vec![ScheduleRule::new(Recurrence::Once)],
        };
        assert!(matches!(
            context.apply(&changes, today()),
            Err(SchedulerError::Denormalize(_))
        ));
        assert_eq!(scheduler.triggers(TASK).unwrap().len(), 1);
        assert_eq!(scheduler.save_count(TASK), 0);
    }

    #[test]
    fn write_failures_propagate() {
        let scheduler = MockScheduler::new().with_task(TASK, vec![weekly_raw(0x01)]);
        scheduler.fail_writes(TASK);
        let mut context = TaskContext::activate(&scheduler, TASK).unwrap();
        let changes = TriggerDiff {
            to_delete: vec![0],
            to_create: Vec::new(),
        };
        assert!(matches!(
            context.apply(&changes, today()),
            Err(SchedulerError::Operation { .. })
        ));
    }
}
