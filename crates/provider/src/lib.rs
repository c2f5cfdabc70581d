//! Shadow storage resource provider: lifecycle hooks, the per-drive
//! reconciler and whole-run drivers for `list`, `plan` and `apply`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{error, info};
use vss_core::{StartDate, StorageRecord};
use vss_scheduler::TaskScheduler;
use vss_vssadmin::ShadowStorageAdmin;

mod manifest;
mod provider;
mod reconcile;

pub use manifest::{load_manifest, DesiredState, Manifest, ManifestError};
pub use provider::VssProvider;
pub use reconcile::{plan, Convergence, Plan, QuotaAction, QuotaChange, Reconciler, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    InSync,
    Converged(Convergence),
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub resources: Vec<ResourceOutcome>,
    pub records: Vec<StorageRecord>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| matches!(resource.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

pub fn list_storage<A, S>(admin: &A, scheduler: &S, drive: Option<&str>) -> Result<Vec<StorageRecord>>
where
    A: ShadowStorageAdmin + ?Sized,
    S: TaskScheduler,
{
    provider::observe(admin, scheduler, drive).ok_or_else(|| anyhow!("shadow storage listing failed"))
}

pub fn plan_run<A, S>(resources: &[DesiredState], admin: &A, scheduler: &S) -> Result<Vec<Plan>>
where
    A: ShadowStorageAdmin + ?Sized,
    S: TaskScheduler,
{
    let providers = VssProvider::prefetch(resources, admin, scheduler)
        .ok_or_else(|| anyhow!("shadow storage listing failed"))?;
    resources
        .iter()
        .map(|desired| plan(desired, providers.get(&desired.name).and_then(VssProvider::current)))
        .collect()
}

/// Converges every declared drive in turn. One drive failing does not stop
/// the others; the failure is recorded in its outcome.
pub fn apply_run<A, S>(resources: &[DesiredState], admin: &A, scheduler: &S, today: StartDate) -> Result<RunSummary>
where
    A: ShadowStorageAdmin + ?Sized,
    S: TaskScheduler,
{
    let mut providers = VssProvider::prefetch(resources, admin, scheduler)
        .ok_or_else(|| anyhow!("shadow storage listing failed"))?;
    let reconciler = Reconciler::new(admin, scheduler, today);
    let mut summary = RunSummary::default();

    for desired in resources {
        let provider = providers
            .entry(desired.name.clone())
            .or_insert_with(|| VssProvider::absent(&desired.name));
        let outcome = match reconciler.reconcile(desired, provider) {
            Ok(convergence) if convergence.transition == Transition::InSync => Outcome::InSync,
            Ok(convergence) => Outcome::Converged(convergence),
            Err(err) => {
                error!(drive = %desired.name, error = %format!("{:#}", err), "convergence failed");
                Outcome::Failed {
                    message: format!("{:#}", err),
                }
            }
        };
        if let Some(record) = provider.current() {
            summary.records.push(record.clone());
        }
        summary.resources.push(ResourceOutcome {
            name: desired.name.clone(),
            outcome,
        });
    }

    info!(
        resources = summary.resources.len(),
        failures = summary.failures(),
        "run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vss_core::{Ensure, Percent, Recurrence, ScheduleRule, StartTime, Weekday};
    use vss_scheduler::mock::MockScheduler;
    use vss_scheduler::{RawTrigger, TriggerData, TASK_TIME_TRIGGER_DAILY, TASK_TIME_TRIGGER_WEEKLY};
    use vss_vssadmin::mock::{volume_id, MockShadowStorage, QuotaCall, QuotaVerb};

    fn pct(value: u8) -> Percent {
        Percent::new(value).unwrap()
    }

    fn today() -> StartDate {
        StartDate::from_ymd(2024, 3, 1).unwrap()
    }

    fn task(drive: &str) -> String {
        vss_core::snapshot_task_name(&volume_id(drive))
    }

    fn raw(trigger_type: u32, data: TriggerData, hour: u16) -> RawTrigger {
        RawTrigger {
            begin_year: 2024,
            begin_month: 1,
            begin_day: 1,
            start_hour: hour,
            trigger_type,
            data,
            ..RawTrigger::default()
        }
    }

    fn weekly_raw(days_of_week: u16) -> RawTrigger {
        raw(
            TASK_TIME_TRIGGER_WEEKLY,
            TriggerData {
                weeks_interval: 1,
                days_of_week,
                ..TriggerData::default()
            },
            7,
        )
    }

    fn daily_raw() -> RawTrigger {
        raw(
            TASK_TIME_TRIGGER_DAILY,
            TriggerData {
                days_interval: 1,
                ..TriggerData::default()
            },
            7,
        )
    }

    fn weekly_rule(day: Weekday, hour: u8) -> ScheduleRule {
        ScheduleRule::new(Recurrence::Weekly {
            every: Some(1),
            days_of_week: Some([day].into_iter().collect()),
        })
        .starting(None, StartTime::from_hm(hour, 0).ok())
    }

    fn present(name: &str, volume: &str, space: u8, schedule: Option<Vec<ScheduleRule>>) -> DesiredState {
        DesiredState {
            storage_volume: Some(volume.to_string()),
            storage_space: Some(pct(space)),
            schedule,
            ..DesiredState::new(name, Ensure::Present)
        }
    }

    #[test]
    fn matching_drive_is_left_alone() {
        let admin = MockShadowStorage::new().with_association("C", "C", pct(10));
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![weekly_raw(0x02)]);
        let resources = vec![present("C", "C", 10, Some(vec![weekly_rule(Weekday::Mon, 7)]))];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert_eq!(summary.resources[0].outcome, Outcome::InSync);
        assert!(admin.calls().is_empty());
        assert_eq!(scheduler.save_count(&task("C")), 0);
    }

    #[test]
    fn drifted_drive_is_resized_and_triggers_replaced() {
        let admin = MockShadowStorage::new().with_association("C", "D", pct(10));
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![daily_raw(), weekly_raw(0x02)]);
        let resources = vec![present(
            "C",
            "D",
            15,
            Some(vec![weekly_rule(Weekday::Mon, 7), weekly_rule(Weekday::Fri, 7)]),
        )];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert!(summary.is_success());
        assert_eq!(
            summary.resources[0].outcome,
            Outcome::Converged(Convergence {
                transition: Transition::Flush,
                max_size: Some(pct(15)),
                deleted_triggers: 1,
                created_triggers: 1,
            })
        );
        assert_eq!(
            admin.calls(),
            vec![QuotaCall {
                verb: QuotaVerb::Resize,
                drive: "C".to_string(),
                storage_volume: "D".to_string(),
                max_size: pct(15),
            }]
        );
        let triggers = scheduler.triggers(&task("C")).unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].data.days_of_week, 0x02);
        assert_eq!(triggers[1].data.days_of_week, 0x20);
        assert_eq!((triggers[1].begin_year, triggers[1].begin_month, triggers[1].begin_day), (2024, 3, 1));

        // the snapshot reflects the converged state
        let record = &summary.records[0];
        assert_eq!(record.storage_space, pct(15));
        assert_eq!(record.schedule.rules().map(<[ScheduleRule]>::len), Some(2));
    }

    #[test]
    fn second_apply_is_a_no_op() {
        let admin = MockShadowStorage::new().with_association("C", "D", pct(10));
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![daily_raw()]);
        let resources = vec![present("C", "D", 20, Some(vec![weekly_rule(Weekday::Sat, 6)]))];

        apply_run(&resources, &admin, &scheduler, today()).unwrap();
        let calls = admin.calls().len();
        let again = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert_eq!(again.resources[0].outcome, Outcome::InSync);
        assert_eq!(admin.calls().len(), calls);
    }

    #[test]
    fn destroy_always_issues_zero_quota() {
        let admin = MockShadowStorage::new().with_association("C", "C", Percent::ZERO);
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![daily_raw()]);
        let resources = vec![DesiredState {
            schedule: Some(vec![weekly_rule(Weekday::Sun, 1)]),
            ..DesiredState::new("C", Ensure::Absent)
        }];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert_eq!(
            admin.calls(),
            vec![QuotaCall {
                verb: QuotaVerb::Resize,
                drive: "C".to_string(),
                storage_volume: "C".to_string(),
                max_size: Percent::ZERO,
            }]
        );
        // the extra trigger goes, nothing is created while removing
        assert!(scheduler.triggers(&task("C")).unwrap().is_empty());
        match &summary.resources[0].outcome {
            Outcome::Converged(convergence) => {
                assert_eq!(convergence.transition, Transition::Destroy);
                assert_eq!(convergence.created_triggers, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(summary.records.is_empty());
    }

    #[test]
    fn absent_drive_that_is_absent_is_in_sync() {
        let admin = MockShadowStorage::new();
        let resources = vec![DesiredState::new("C", Ensure::Absent)];
        let summary = apply_run(&resources, &admin, &MockScheduler::new(), today()).unwrap();
        assert_eq!(summary.resources[0].outcome, Outcome::InSync);
        assert!(admin.calls().is_empty());
    }

    #[test]
    fn missing_association_is_added() {
        let admin = MockShadowStorage::new();
        let scheduler = MockScheduler::new().with_task(&task("E"), Vec::new());
        let resources = vec![present("E", "D", 5, Some(vec![weekly_rule(Weekday::Tues, 3)]))];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert!(summary.is_success(), "{:?}", summary);
        assert_eq!(admin.calls()[0].verb, QuotaVerb::Add);
        assert_eq!(admin.max_size("E"), Some(pct(5)));
        assert_eq!(scheduler.triggers(&task("E")).unwrap().len(), 1);
        assert_eq!(summary.records[0].ensure, Ensure::Present);
    }

    #[test]
    fn failures_are_isolated_per_drive() {
        let admin = MockShadowStorage::new()
            .with_association("C", "C", pct(10))
            .with_association("D", "D", pct(10));
        let scheduler = MockScheduler::new()
            .with_task(&task("C"), vec![daily_raw()])
            .with_task(&task("D"), vec![daily_raw()]);
        scheduler.fail_writes(&task("C"));
        let resources = vec![
            present("C", "C", 10, Some(vec![weekly_rule(Weekday::Mon, 1)])),
            present("D", "D", 10, Some(vec![weekly_rule(Weekday::Mon, 1)])),
        ];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert_eq!(summary.failures(), 1);
        match &summary.resources[0].outcome {
            Outcome::Failed { message } => assert!(message.contains("update triggers"), "{}", message),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(summary.resources[1].outcome, Outcome::Converged(_)));
        assert_eq!(scheduler.triggers(&task("D")).unwrap()[0].trigger_type, TASK_TIME_TRIGGER_WEEKLY);
    }

    #[test]
    fn quota_failure_skips_the_schedule_step() {
        let admin = MockShadowStorage::new()
            .with_association("C", "C", pct(10))
            .failing_quota();
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![daily_raw()]);
        let resources = vec![present("C", "C", 12, Some(vec![weekly_rule(Weekday::Mon, 1)]))];

        let summary = apply_run(&resources, &admin, &scheduler, today()).unwrap();
        assert!(!summary.is_success());
        assert_eq!(scheduler.triggers(&task("C")).unwrap(), vec![daily_raw()]);
        assert_eq!(summary.records[0].storage_space, pct(10));
    }

    #[test]
    fn listing_failure_aborts_the_run() {
        let admin = MockShadowStorage::new().failing_list();
        let resources = vec![DesiredState::new("C", Ensure::Present)];
        assert!(apply_run(&resources, &admin, &MockScheduler::new(), today()).is_err());
        assert!(plan_run(&resources, &admin, &MockScheduler::new()).is_err());
        assert!(list_storage(&admin, &MockScheduler::new(), None).is_err());
    }

    #[test]
    fn plan_run_does_not_mutate() {
        let admin = MockShadowStorage::new().with_association("C", "C", pct(10));
        let scheduler = MockScheduler::new().with_task(&task("C"), vec![daily_raw()]);
        let resources = vec![present("C", "C", 30, Some(vec![weekly_rule(Weekday::Mon, 1)]))];

        let plans = plan_run(&resources, &admin, &scheduler).unwrap();
        assert_eq!(plans[0].transition, Transition::Flush);
        assert_eq!(plans[0].delete_triggers, vec![0]);
        assert_eq!(plans[0].create_triggers.len(), 1);
        assert!(admin.calls().is_empty());
        assert_eq!(scheduler.save_count(&task("C")), 0);
    }

    #[test]
    fn summary_serializes_with_status_tags() {
        let summary = RunSummary {
            resources: vec![
                ResourceOutcome {
                    name: "C".to_string(),
                    outcome: Outcome::InSync,
                },
                ResourceOutcome {
                    name: "D".to_string(),
                    outcome: Outcome::Failed {
                        message: "boom".to_string(),
                    },
                },
            ],
            records: Vec::new(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["resources"][0]["status"], "in-sync");
        assert_eq!(json["resources"][1]["status"], "failed");
        assert_eq!(json["resources"][1]["message"], "boom");
    }
}
