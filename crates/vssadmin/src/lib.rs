//! Shadow storage listing and quota administration through `vssadmin`.

use tracing::{debug, warn};
use vss_core::{Schedule, StorageRecord};

mod command;
pub mod mock;
mod parse;

pub use command::{quota_args, CommandError, ShadowStorageAdmin, VssAdmin};
pub use parse::{classify, parse, Diagnostic, DiagnosticKind, LineKind, ParseReport};

/// Lists shadow storage and parses it, optionally for one drive.
///
/// Returns `None` when the listing command itself fails, which callers must
/// keep apart from an empty listing.
pub fn collect_storage_info<A, F>(admin: &A, drive: Option<&str>, lookup: F) -> Option<Vec<StorageRecord>>
where
    A: ShadowStorageAdmin + ?Sized,
    F: FnMut(&str) -> Schedule,
{
    let text = match admin.list_shadow_storage() {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "shadow storage listing failed");
            return None;
        }
    };
    let report = parse(&text, drive, lookup);
    debug!(
        records = report.records.len(),
        diagnostics = report.diagnostics.len(),
        drive = drive.unwrap_or("all"),
        "parsed shadow storage"
    );
    Some(report.records)
}

#[cfg(test)]
mod tests {
    use super::mock::MockShadowStorage;
    use super::*;
    use vss_core::Percent;

    #[test]
    fn failed_listing_is_no_data() {
        let admin = MockShadowStorage::new().failing_list();
        assert_eq!(collect_storage_info(&admin, None, |_| Schedule::Absent), None);
    }

    #[test]
    fn empty_listing_is_zero_records() {
        let admin = MockShadowStorage::new();
        assert_eq!(
            collect_storage_info(&admin, None, |_| Schedule::Absent),
            Some(Vec::new())
        );
    }

    #[test]
    fn drive_filter_is_applied() {
        let admin = MockShadowStorage::new()
            .with_association("C", "C", Percent::new(10).unwrap())
            .with_association("D", "D", Percent::new(20).unwrap());
        let records = collect_storage_info(&admin, Some("d:"), |_| Schedule::Absent).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "D");
    }
}
