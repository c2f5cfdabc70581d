use crate::manifest::DesiredState;
use crate::provider::{observe, VssProvider};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use vss_core::{snapshot_task_name, Ensure, Percent, ScheduleRule, StartDate, StorageRecord};
use vss_scheduler::{diff, ApplyOutcome, SchedulerError, TaskContext, TaskScheduler, TriggerDiff};
use vss_vssadmin::ShadowStorageAdmin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    Create,
    Destroy,
    Flush,
    InSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaAction {
    Add,
    Resize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaChange {
    pub action: QuotaAction,
    pub storage_volume: String,
    pub max_size: Percent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub name: String,
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaChange>,
    pub delete_triggers: Vec<usize>,
    pub create_triggers: Vec<ScheduleRule>,
}

impl Plan {
    fn in_sync(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transition: Transition::InSync,
            quota: None,
            delete_triggers: Vec::new(),
            create_triggers: Vec::new(),
        }
    }
}

/// Works out the transition, quota call and trigger changes for `desired`
/// against the observed `current` record, without touching the system.
pub fn plan(desired: &DesiredState, current: Option<&StorageRecord>) -> Result<Plan> {
    let exists = current.map_or(false, |record| record.ensure == Ensure::Present);
    let mut transition = match (desired.ensure, exists) {
        (Ensure::Present, false) => Transition::Create,
        (Ensure::Absent, true) => Transition::Destroy,
        (Ensure::Present, true) => Transition::Flush,
        (Ensure::Absent, false) => return Ok(Plan::in_sync(&desired.name)),
    };
    let removing = transition == Transition::Destroy;

    let current_rules = current
        .and_then(|record| record.schedule.rules())
        .unwrap_or_default();
    let triggers = match &desired.schedule {
        Some(wanted) => diff(current_rules, wanted, removing),
        None => TriggerDiff::default(),
    };

    if let (Transition::Flush, Some(record)) = (transition, current) {
        let quota_drift = desired
            .storage_space
            .map_or(false, |space| space != record.storage_space);
        let volume_drift = desired
            .storage_volume
            .as_ref()
            .map_or(false, |volume| record.storage_volume.as_ref() != Some(volume));
        if !quota_drift && !volume_drift && triggers.is_empty() {
            transition = Transition::InSync;
        }
    }
    if transition == Transition::InSync {
        return Ok(Plan::in_sync(&desired.name));
    }

    let max_size = if removing {
        Percent::ZERO
    } else {
        desired
            .storage_space
            .or(current.map(|record| record.storage_space))
            .ok_or_else(|| anyhow!("drive {}: storage_space is required to create shadow storage", desired.name))?
    };
    let observed_volume = current.and_then(|record| record.storage_volume.clone());
    let action = if observed_volume.is_some() {
        QuotaAction::Resize
    } else {
        QuotaAction::Add
    };
    let storage_volume = desired
        .storage_volume
        .clone()
        .or(observed_volume)
        .ok_or_else(|| anyhow!("drive {}: storage_volume is required to create shadow storage", desired.name))?;

    Ok(Plan {
        name: desired.name.clone(),
        transition,
        quota: Some(QuotaChange {
            action,
            storage_volume,
            max_size,
        }),
        delete_triggers: triggers.deletion_order(),
        create_triggers: triggers.to_create,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Convergence {
    pub transition: Transition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Percent>,
    pub deleted_triggers: usize,
    pub created_triggers: usize,
}

impl Convergence {
    fn in_sync() -> Self {
        Self {
            transition: Transition::InSync,
            max_size: None,
            deleted_triggers: 0,
            created_triggers: 0,
        }
    }
}

pub struct Reconciler<'a, A: ?Sized, S> {
    admin: &'a A,
    scheduler: &'a S,
    today: StartDate,
}

impl<'a, A, S> Reconciler<'a, A, S>
where
    A: ShadowStorageAdmin + ?Sized,
    S: TaskScheduler,
{
    /// `today` fills in the start date of created triggers that declare none.
    pub fn new(admin: &'a A, scheduler: &'a S, today: StartDate) -> Self {
        Self {
            admin,
            scheduler,
            today,
        }
    }

    /// One convergence cycle: quota, then triggers, then a fresh read of the
    /// drive. A failed step leaves the later ones undone.
    pub fn reconcile(&self, desired: &DesiredState, provider: &mut VssProvider) -> Result<Convergence> {
        let plan = plan(desired, provider.current())?;
        match plan.transition {
            Transition::InSync => {
                debug!(drive = %desired.name, "in sync");
                return Ok(Convergence::in_sync());
            }
            Transition::Create => provider.create(),
            Transition::Destroy => provider.destroy(),
            Transition::Flush => {}
        }
        self.flush(desired, provider, &plan)
    }

    fn flush(&self, desired: &DesiredState, provider: &mut VssProvider, plan: &Plan) -> Result<Convergence> {
        let quota = plan
            .quota
            .as_ref()
            .ok_or_else(|| anyhow!("drive {}: no quota change planned", desired.name))?;
        self.set_storage(&desired.name, quota)?;

        let removing = provider.pending_ensure() == Some(Ensure::Absent);
        let triggers = self.set_schedule(desired, provider, removing)?;

        let fresh = match observe(self.admin, self.scheduler, Some(&desired.name)) {
            Some(records) => records.into_iter().next(),
            None => {
                warn!(drive = %desired.name, "could not re-read shadow storage after flush");
                None
            }
        };
        provider.refresh(fresh);

        Ok(Convergence {
            transition: plan.transition,
            max_size: Some(quota.max_size),
            deleted_triggers: triggers.deleted,
            created_triggers: triggers.created,
        })
    }

    fn set_storage(&self, drive: &str, quota: &QuotaChange) -> Result<()> {
        let result = match quota.action {
            QuotaAction::Add => self
                .admin
                .add_shadow_storage(drive, &quota.storage_volume, quota.max_size),
            QuotaAction::Resize => self
                .admin
                .resize_shadow_storage(drive, &quota.storage_volume, quota.max_size),
        };
        result.with_context(|| {
            format!(
                "set shadow storage for {} on {} to {}",
                drive, quota.storage_volume, quota.max_size
            )
        })?;
        info!(
            drive,
            on = %quota.storage_volume,
            max_size = %quota.max_size,
            action = ?quota.action,
            "set shadow storage quota"
        );
        Ok(())
    }

    /// Diffs the declared rules against the task's triggers as they are now
    /// and applies the difference.
    fn set_schedule(&self, desired: &DesiredState, provider: &VssProvider, removing: bool) -> Result<ApplyOutcome> {
        let Some(wanted) = &desired.schedule else {
            return Ok(ApplyOutcome::default());
        };
        let drive_id = match provider.current() {
            Some(record) => record.drive_id.clone(),
            None => observe(self.admin, self.scheduler, Some(&desired.name))
                .and_then(|records| records.into_iter().next())
                .map(|record| record.drive_id)
                .ok_or_else(|| anyhow!("drive {} is not listed after adding shadow storage", desired.name))?,
        };
        let task_name = snapshot_task_name(&drive_id);
        let mut context = match TaskContext::activate(self.scheduler, &task_name) {
            Ok(context) => context,
            Err(SchedulerError::TaskNotFound(_)) if removing || wanted.is_empty() => {
                debug!(task = %task_name, "no snapshot task, nothing to remove");
                return Ok(ApplyOutcome::default());
            }
            Err(err) => return Err(err).with_context(|| format!("open snapshot task {}", task_name)),
        };
        let changes = diff(
            context
                .rules()
                .with_context(|| format!("read triggers of {}", task_name))?,
            wanted,
            removing,
        );
        let outcome = context
            .apply(&changes, self.today)
            .with_context(|| format!("update triggers of {}", task_name))?;
        Ok(outcome)
    }
}
