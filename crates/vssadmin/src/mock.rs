//! In-memory shadow storage admin that renders `vssadmin`-shaped listings.

use crate::{CommandError, ShadowStorageAdmin};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use vss_core::{normalize_drive_name, Percent};

const PROGRAM: &str = "vssadmin.exe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaVerb {
    Add,
    Resize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCall {
    pub verb: QuotaVerb,
    pub drive: String,
    pub storage_volume: String,
    pub max_size: Percent,
}

#[derive(Debug, Clone)]
struct Association {
    storage_volume: String,
    max_size: Percent,
}

#[derive(Debug, Default)]
struct MockState {
    associations: BTreeMap<String, Association>,
    calls: Vec<QuotaCall>,
    list_fails: bool,
    quota_fails: bool,
}

#[derive(Debug, Default)]
pub struct MockShadowStorage {
    state: RefCell<MockState>,
}

/// Stable fake volume GUID for a drive letter.
pub fn volume_id(drive: &str) -> String {
    let letter = normalize_drive_name(drive).bytes().next().unwrap_or(b'?');
    format!("{:08x}-0000-0000-0000-100000000000", u32::from(letter))
}

impl MockShadowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_association(self, drive: &str, storage_volume: &str, max_size: Percent) -> Self {
        self.state.borrow_mut().associations.insert(
            normalize_drive_name(drive),
            Association {
                storage_volume: normalize_drive_name(storage_volume),
                max_size,
            },
        );
        self
    }

    /// Every listing fails, as when the tool is missing or access is denied.
    pub fn failing_list(self) -> Self {
        self.state.borrow_mut().list_fails = true;
        self
    }

    pub fn failing_quota(self) -> Self {
        self.state.borrow_mut().quota_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<QuotaCall> {
        self.state.borrow().calls.clone()
    }

    pub fn max_size(&self, drive: &str) -> Option<Percent> {
        self.state
            .borrow()
            .associations
            .get(&normalize_drive_name(drive))
            .map(|association| association.max_size)
    }

    pub fn render(&self) -> String {
        let state = self.state.borrow();
        let mut out = String::from(
            "vssadmin 1.1 - Volume Shadow Copy Service administrative command-line tool\n\
             (C) Copyright 2001-2013 Microsoft Corp.\n\n",
        );
        if state.associations.is_empty() {
            out.push_str("No items found that satisfy the query.\n");
            return out;
        }
        for (drive, association) in &state.associations {
            let on = &association.storage_volume;
            let maximum = if association.max_size.value() == 100 {
                "UNBOUNDED".to_string()
            } else {
                format!("{} GB", u32::from(association.max_size.value()) * 2)
            };
            let _ = write!(
                out,
                "Shadow Copy Storage association\n   \
                 For volume: ({drive}:)\\\\?\\Volume{{{drive_id}}}\\\n   \
                 Shadow Copy Storage volume: ({on}:)\\\\?\\Volume{{{on_id}}}\\\n   \
                 Used Shadow Copy Storage space: 0 bytes (0%)\n   \
                 Allocated Shadow Copy Storage space: 0 bytes (0%)\n   \
                 Maximum Shadow Copy Storage space: {maximum} ({max_size})\n\n",
                drive_id = volume_id(drive),
                on_id = volume_id(on),
                max_size = association.max_size,
            );
        }
        out
    }

    fn record(&self, verb: QuotaVerb, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError> {
        let mut state = self.state.borrow_mut();
        let drive = normalize_drive_name(drive);
        let storage_volume = normalize_drive_name(storage_volume);
        state.calls.push(QuotaCall {
            verb,
            drive: drive.clone(),
            storage_volume: storage_volume.clone(),
            max_size,
        });
        let fail = |message: &str| CommandError::Failed {
            program: PROGRAM.to_string(),
            verb: match verb {
                QuotaVerb::Add => "add shadowstorage".to_string(),
                QuotaVerb::Resize => "resize shadowstorage".to_string(),
            },
            status: "exit code: 2".to_string(),
            message: message.to_string(),
        };
        if state.quota_fails {
            return Err(fail("Error: Access is denied."));
        }
        let exists = state.associations.contains_key(&drive);
        match verb {
            QuotaVerb::Add if exists => Err(fail(
                "Error: The specified shadow copy storage association already exists.",
            )),
            QuotaVerb::Resize if !exists => Err(fail(
                "Error: The specified shadow copy storage association was not found.",
            )),
            QuotaVerb::Resize if max_size == Percent::ZERO => {
                state.associations.remove(&drive);
                Ok(())
            }
            _ => {
                state.associations.insert(
                    drive,
                    Association {
                        storage_volume,
                        max_size,
                    },
                );
                Ok(())
            }
        }
    }
}

impl ShadowStorageAdmin for MockShadowStorage {
    fn list_shadow_storage(&self) -> Result<String, CommandError> {
        if self.state.borrow().list_fails {
            return Err(CommandError::Failed {
                program: PROGRAM.to_string(),
                verb: "list shadowstorage".to_string(),
                status: "exit code: 1".to_string(),
                message: "Error: Access is denied.".to_string(),
            });
        }
        Ok(self.render())
    }

    fn resize_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError> {
        self.record(QuotaVerb::Resize, drive, storage_volume, max_size)
    }

    fn add_shadow_storage(&self, drive: &str, storage_volume: &str, max_size: Percent) -> Result<(), CommandError> {
        self.record(QuotaVerb::Add, drive, storage_volume, max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use vss_core::{Ensure, Schedule};

    fn pct(value: u8) -> Percent {
        Percent::new(value).unwrap()
    }

    #[test]
    fn rendered_listing_parses_back() {
        let admin = MockShadowStorage::new()
            .with_association("c", "C", pct(10))
            .with_association("E", "D", pct(100));
        let text = admin.list_shadow_storage().unwrap();
        let report = parse(&text, None, |_| Schedule::Absent);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].drive_id, volume_id("C"));
        assert_eq!(report.records[1].storage_volume.as_deref(), Some("D"));
        assert_eq!(report.records[1].storage_space, pct(100));
        assert_eq!(report.records[1].ensure, Ensure::Present);
    }

    #[test]
    fn empty_listing_has_no_records() {
        let text = MockShadowStorage::new().list_shadow_storage().unwrap();
        let report = parse(&text, None, |_| Schedule::Absent);
        assert!(report.records.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn resize_to_zero_removes_the_association() {
        let admin = MockShadowStorage::new().with_association("C", "D", pct(10));
        admin.resize_shadow_storage("C", "D", Percent::ZERO).unwrap();
        assert_eq!(admin.max_size("C"), None);
        assert!(admin.resize_shadow_storage("C", "D", Percent::ZERO).is_err());
        assert_eq!(admin.calls().len(), 2);
    }

    #[test]
    fn add_requires_a_missing_association() {
        let admin = MockShadowStorage::new();
        admin.add_shadow_storage("C", "D", pct(5)).unwrap();
        assert_eq!(admin.max_size("C"), Some(pct(5)));
        assert!(admin.add_shadow_storage("C", "D", pct(5)).is_err());
    }
}
