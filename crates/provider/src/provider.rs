use crate::manifest::DesiredState;
use std::collections::BTreeMap;
use tracing::debug;
use vss_core::{normalize_drive_name, Ensure, StorageRecord};
use vss_scheduler::{read_schedule, TaskScheduler};
use vss_vssadmin::{collect_storage_info, ShadowStorageAdmin};

/// Lifecycle hooks for one drive's shadow storage.
///
/// Holds the last observed record and the ensure transition requested by
/// `create`/`destroy` until the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VssProvider {
    name: String,
    property_hash: Option<StorageRecord>,
    property_flush: Option<Ensure>,
}

pub(crate) fn observe<A, S>(admin: &A, scheduler: &S, drive: Option<&str>) -> Option<Vec<StorageRecord>>
where
    A: ShadowStorageAdmin + ?Sized,
    S: TaskScheduler,
{
    collect_storage_info(admin, drive, |task| read_schedule(scheduler, task))
}

impl VssProvider {
    pub fn absent(name: &str) -> Self {
        Self {
            name: normalize_drive_name(name),
            property_hash: None,
            property_flush: None,
        }
    }

    pub fn from_record(record: StorageRecord) -> Self {
        Self {
            name: record.name.clone(),
            property_hash: Some(record),
            property_flush: None,
        }
    }

    /// One provider per listed drive; `None` when the listing fails.
    pub fn instances<A, S>(admin: &A, scheduler: &S) -> Option<Vec<Self>>
    where
        A: ShadowStorageAdmin + ?Sized,
        S: TaskScheduler,
    {
        observe(admin, scheduler, None).map(|records| records.into_iter().map(Self::from_record).collect())
    }

    /// Binds every declared drive to its listed instance, or to an absent
    /// provider when the drive has no association yet.
    pub fn prefetch<A, S>(
        resources: &[DesiredState],
        admin: &A,
        scheduler: &S,
    ) -> Option<BTreeMap<String, Self>>
    where
        A: ShadowStorageAdmin + ?Sized,
        S: TaskScheduler,
    {
        let mut found: BTreeMap<String, Self> = Self::instances(admin, scheduler)?
            .into_iter()
            .map(|provider| (provider.name.clone(), provider))
            .collect();
        let bound = resources
            .iter()
            .map(|desired| {
                let provider = found.remove(&desired.name).unwrap_or_else(|| {
                    debug!(drive = %desired.name, "no shadow storage listed");
                    Self::absent(&desired.name)
                });
                (desired.name.clone(), provider)
            })
            .collect();
        Some(bound)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Option<&StorageRecord> {
        self.property_hash.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.property_hash
            .as_ref()
            .map_or(false, |record| record.ensure == Ensure::Present)
    }

    pub fn create(&mut self) {
        self.property_flush = Some(Ensure::Present);
    }

    pub fn destroy(&mut self) {
        self.property_flush = Some(Ensure::Absent);
    }

    pub fn pending_ensure(&self) -> Option<Ensure> {
        self.property_flush
    }

    /// Replaces the snapshot with a fresh read and clears the pending transition.
    pub(crate) fn refresh(&mut self, record: Option<StorageRecord>) {
        self.property_hash = record;
        self.property_flush = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vss_core::{Percent, Schedule};
    use vss_scheduler::mock::MockScheduler;
    use vss_vssadmin::mock::MockShadowStorage;

    #[test]
    fn instances_come_from_the_listing() {
        let admin = MockShadowStorage::new()
            .with_association("C", "C", Percent::new(10).unwrap())
            .with_association("D", "E", Percent::new(20).unwrap());
        let providers = VssProvider::instances(&admin, &MockScheduler::new()).unwrap();
        let names: Vec<_> = providers.iter().map(VssProvider::name).collect();
        assert_eq!(names, vec!["C", "D"]);
        assert!(providers.iter().all(VssProvider::exists));
        assert_eq!(providers[1].current().unwrap().schedule, Schedule::Absent);
    }

    #[test]
    fn prefetch_binds_missing_drives_as_absent() {
        let admin = MockShadowStorage::new().with_association("C", "C", Percent::new(10).unwrap());
        let resources = vec![
            DesiredState::new("c", Ensure::Present),
            DesiredState::new("f", Ensure::Present),
        ];
        let bound = VssProvider::prefetch(&resources, &admin, &MockScheduler::new()).unwrap();
        assert!(bound["C"].exists());
        assert!(!bound["F"].exists());
        assert_eq!(bound["F"].current(), None);

        let failing = MockShadowStorage::new().failing_list();
        assert_eq!(VssProvider::prefetch(&resources, &failing, &MockScheduler::new()), None);
    }

    #[test]
    fn create_and_destroy_only_record_intent() {
        let mut provider = VssProvider::absent("c:");
        assert_eq!(provider.name(), "C");
        provider.create();
        assert_eq!(provider.pending_ensure(), Some(Ensure::Present));
        provider.destroy();
        assert_eq!(provider.pending_ensure(), Some(Ensure::Absent));
        assert!(!provider.exists());
    }
}
