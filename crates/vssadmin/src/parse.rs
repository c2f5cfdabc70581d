//! `vssadmin list shadowstorage` output, one association block per drive:
//!
//! ```text
//! Shadow Copy Storage association
//!    For volume: (C:)\\?\Volume{6d7a1c2e-0000-0000-0000-100000000000}\
//!    Shadow Copy Storage volume: (D:)\\?\Volume{8f31aa04-0000-0000-0000-100000000000}\
//!    Used Shadow Copy Storage space: 1.2 GB (1%)
//!    Allocated Shadow Copy Storage space: 1.5 GB (1%)
//!    Maximum Shadow Copy Storage space: 12.5 GB (10%)
//! ```
//!
//! A block opens at its `For volume` header and completes at the `Maximum`
//! line. Blocks that never reach a quota line are discarded.

use std::fmt;
use tracing::debug;
use vss_core::{normalize_drive_name, snapshot_task_name, Ensure, Percent, Schedule, StorageRecord};

const HEADER: &str = "For volume:";
const STORAGE: &str = "Shadow Copy Storage volume:";
const QUOTA: &str = "Maximum Shadow Copy Storage space:";
const USED: &str = "Used Shadow Copy Storage space:";
const ALLOCATED: &str = "Allocated Shadow Copy Storage space:";
const ASSOCIATION: &str = "Shadow Copy Storage association";
const BANNERS: [&str; 3] = ["vssadmin ", "(C) Copyright", "No items found"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Banner,
    Association,
    Header(&'a str),
    Storage(&'a str),
    Usage,
    Quota(&'a str),
    Unrecognized,
}

pub fn classify(line: &str) -> LineKind<'_> {
    let line = line.trim();
    if line.is_empty() {
        return LineKind::Blank;
    }
    if let Some(rest) = line.strip_prefix(HEADER) {
        return LineKind::Header(rest.trim());
    }
    if let Some(rest) = line.strip_prefix(STORAGE) {
        return LineKind::Storage(rest.trim());
    }
    if let Some(rest) = line.strip_prefix(QUOTA) {
        return LineKind::Quota(rest.trim());
    }
    if line.starts_with(USED) || line.starts_with(ALLOCATED) {
        return LineKind::Usage;
    }
    if line.starts_with(ASSOCIATION) {
        return LineKind::Association;
    }
    if BANNERS.iter().any(|banner| line.starts_with(banner)) {
        return LineKind::Banner;
    }
    LineKind::Unrecognized
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Unrecognized,
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number.
    pub line: usize,
    pub kind: DiagnosticKind,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Unrecognized => write!(f, "line {}: unrecognized `{}`", self.line, self.text),
            DiagnosticKind::Malformed(reason) => {
                write!(f, "line {}: {} in `{}`", self.line, reason, self.text)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub records: Vec<StorageRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A `(C:)\\?\Volume{id}\` reference: drive letter and volume id.
fn volume_ref(text: &str) -> Option<(String, String)> {
    let inner = text.strip_prefix('(')?;
    let (label, rest) = inner.split_once(')')?;
    let letter = label.strip_suffix(":\\").or_else(|| label.strip_suffix(':'))?;
    if letter.len() != 1 || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let (_, guid) = rest.split_once('{')?;
    let (id, _) = guid.split_once('}')?;
    if id.is_empty() {
        return None;
    }
    Some((normalize_drive_name(letter), id.to_string()))
}

/// The percentage in the trailing parentheses, `12.5 GB (10%)` or `UNBOUNDED (100%)`.
fn quota_percent(text: &str) -> Option<Percent> {
    let (_, tail) = text.rsplit_once('(')?;
    let (digits, _) = tail.split_once('%')?;
    digits.trim().parse().ok()
}

struct Block {
    line: usize,
    name: String,
    drive_id: String,
    storage: Option<(String, String)>,
}

/// Parses listing output into records, keeping only `drive` when given.
///
/// `lookup` resolves a snapshot task name to its schedule and is only called
/// for records that are emitted.
pub fn parse<F>(text: &str, drive: Option<&str>, mut lookup: F) -> ParseReport
where
    F: FnMut(&str) -> Schedule,
{
    let wanted = drive.map(normalize_drive_name);
    let mut report = ParseReport::default();
    let mut block: Option<Block> = None;

    for (offset, raw) in text.lines().enumerate() {
        let line = offset + 1;
        let mut diagnose = |kind: DiagnosticKind| {
            report.diagnostics.push(Diagnostic {
                line,
                kind,
                text: raw.trim().to_string(),
            })
        };
        match classify(raw) {
            LineKind::Blank | LineKind::Banner | LineKind::Association | LineKind::Usage => {}
            LineKind::Unrecognized => diagnose(DiagnosticKind::Unrecognized),
            LineKind::Header(rest) => {
                if let Some(open) = block.take() {
                    debug!(drive = %open.name, line = open.line, "discarding block without a quota line");
                }
                match volume_ref(rest) {
                    Some((name, drive_id)) => {
                        block = Some(Block {
                            line,
                            name,
                            drive_id,
                            storage: None,
                        })
                    }
                    None => diagnose(DiagnosticKind::Malformed("unreadable source volume")),
                }
            }
            LineKind::Storage(rest) => match (block.as_mut(), volume_ref(rest)) {
                (None, _) => diagnose(DiagnosticKind::Malformed("storage volume outside an association")),
                (Some(_), None) => diagnose(DiagnosticKind::Malformed("unreadable storage volume")),
                (Some(open), Some(storage)) => open.storage = Some(storage),
            },
            LineKind::Quota(rest) => {
                let Some(open) = block.take() else {
                    diagnose(DiagnosticKind::Malformed("quota outside an association"));
                    continue;
                };
                let Some(storage_space) = quota_percent(rest) else {
                    diagnose(DiagnosticKind::Malformed("unreadable maximum size"));
                    continue;
                };
                if wanted.as_deref().map_or(false, |wanted| wanted != open.name) {
                    continue;
                }
                report.records.push(complete(open, storage_space, &mut lookup));
            }
        }
    }

    if let Some(open) = block {
        debug!(drive = %open.name, line = open.line, "discarding truncated block");
    }
    for diagnostic in &report.diagnostics {
        debug!(%diagnostic, "shadow storage listing");
    }
    report
}

fn complete<F>(block: Block, storage_space: Percent, lookup: &mut F) -> StorageRecord
where
    F: FnMut(&str) -> Schedule,
{
    let schedule = lookup(&snapshot_task_name(&block.drive_id));
    let (storage_volume, storage_id, ensure) = match block.storage {
        Some((volume, id)) => (Some(volume), Some(id), Ensure::Present),
        None => (None, None, Ensure::Absent),
    };
    StorageRecord {
        name: block.name,
        drive_id: block.drive_id,
        storage_volume,
        storage_id,
        storage_space,
        schedule,
        ensure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
vssadmin 1.1 - Volume Shadow Copy Service administrative command-line tool
(C) Copyright 2001-2013 Microsoft Corp.

Shadow Copy Storage association
   For volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   Shadow Copy Storage volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   Used Shadow Copy Storage space: 1.2 GB (1%)
   Allocated Shadow Copy Storage space: 1.5 GB (1%)
   Maximum Shadow Copy Storage space: 23.8 GB (10%)

Shadow Copy Storage association
   For volume: (E:)\\\\?\\Volume{eeee-5555}\\
   Shadow Copy Storage volume: (D:)\\\\?\\Volume{dddd-4444}\\
   Used Shadow Copy Storage space: 0 bytes (0%)
   Allocated Shadow Copy Storage space: 0 bytes (0%)
   Maximum Shadow Copy Storage space: UNBOUNDED (100%)
";

    fn no_schedule(_: &str) -> Schedule {
        Schedule::Absent
    }

    #[test]
    fn classifies_known_lines() {
        assert_eq!(classify("   "), LineKind::Blank);
        assert_eq!(classify("Shadow Copy Storage association"), LineKind::Association);
        assert_eq!(classify("  For volume: (C:)x"), LineKind::Header("(C:)x"));
        assert_eq!(
            classify("Maximum Shadow Copy Storage space: 1 GB (5%)"),
            LineKind::Quota("1 GB (5%)")
        );
        assert_eq!(classify("Used Shadow Copy Storage space: 0 bytes (0%)"), LineKind::Usage);
        assert_eq!(classify("something else"), LineKind::Unrecognized);
    }

    #[test]
    fn parses_every_block() {
        let report = parse(LISTING, None, no_schedule);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(report.records.len(), 2);

        let c = &report.records[0];
        assert_eq!(c.name, "C");
        assert_eq!(c.drive_id, "aaaa-1111");
        assert_eq!(c.storage_volume.as_deref(), Some("C"));
        assert_eq!(c.storage_space.value(), 10);
        assert_eq!(c.ensure, Ensure::Present);

        let e = &report.records[1];
        assert_eq!(e.storage_volume.as_deref(), Some("D"));
        assert_eq!(e.storage_id.as_deref(), Some("dddd-4444"));
        assert_eq!(e.storage_space.value(), 100);
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse(LISTING, None, no_schedule), parse(LISTING, None, no_schedule));
    }

    #[test]
    fn drive_filter_is_a_subset() {
        let all = parse(LISTING, None, no_schedule).records;
        for drive in ["C", "e", "Z"] {
            let filtered = parse(LISTING, Some(drive), no_schedule).records;
            let expected: Vec<_> = all
                .iter()
                .filter(|r| r.name == normalize_drive_name(drive))
                .cloned()
                .collect();
            assert_eq!(filtered, expected);
        }
    }

    #[test]
    fn schedule_lookup_uses_task_name() {
        let mut asked = Vec::new();
        parse(LISTING, Some("C"), |task| {
            asked.push(task.to_string());
            Schedule::Rules(Vec::new())
        });
        assert_eq!(asked, vec!["ShadowCopyVolume{aaaa-1111}.job".to_string()]);
    }

    #[test]
    fn truncated_block_is_dropped() {
        let text = "\
   For volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   Shadow Copy Storage volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   For volume: (E:)\\\\?\\Volume{eeee-5555}\\
   Shadow Copy Storage volume: (D:)\\\\?\\Volume{dddd-4444}\\
   Maximum Shadow Copy Storage space: 2 GB (4%)
   For volume: (F:)\\\\?\\Volume{ffff-6666}\\
";
        let records = parse(text, None, no_schedule).records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "E");
        assert_eq!(records[0].storage_volume.as_deref(), Some("D"));
    }

    #[test]
    fn quota_without_storage_is_absent() {
        let text = "\
   For volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   Maximum Shadow Copy Storage space: 2 GB (4%)
";
        let records = parse(text, None, no_schedule).records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ensure, Ensure::Absent);
        assert_eq!(records[0].storage_volume, None);
    }

    #[test]
    fn malformed_header_discards_the_block() {
        let text = "\
   For volume: (C:)\\\\?\\Volume{aaaa-1111}\\
   For volume: garbage
   Shadow Copy Storage volume: (D:)\\\\?\\Volume{dddd-4444}\\
   Maximum Shadow Copy Storage space: 2 GB (4%)
   Error: the listing was cut short
";
        let report = parse(text, None, no_schedule);
        assert!(report.records.is_empty());
        let kinds: Vec<_> = report.diagnostics.iter().map(|d| (d.line, d.kind.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (2, DiagnosticKind::Malformed("unreadable source volume")),
                (3, DiagnosticKind::Malformed("storage volume outside an association")),
                (4, DiagnosticKind::Malformed("quota outside an association")),
                (5, DiagnosticKind::Unrecognized),
            ]
        );
    }

    #[test]
    fn whole_percentages_are_kept() {
        assert_eq!(quota_percent("9.5 GB (15%)").map(Percent::value), Some(15));
        assert_eq!(quota_percent("UNBOUNDED (100%)").map(Percent::value), Some(100));
        assert_eq!(quota_percent("1 GB (7 %)").map(Percent::value), Some(7));
        assert_eq!(quota_percent("1 GB"), None);
    }

    #[test]
    fn volume_refs_need_a_letter_and_id() {
        assert_eq!(
            volume_ref("(d:)\\\\?\\Volume{abc}\\"),
            Some(("D".to_string(), "abc".to_string()))
        );
        assert_eq!(volume_ref("(\\\\?\\Volume{abc}\\)\\\\?\\Volume{abc}\\"), None);
        assert_eq!(volume_ref("(C:)\\\\?\\Volume{}\\"), None);
    }
}
