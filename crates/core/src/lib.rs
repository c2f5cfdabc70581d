use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

mod decl;
mod rule;
mod tags;

pub use decl::{OneOrMany, RuleDecl, Scalar};
pub use rule::{Recurrence, RuleError, ScheduleKind, ScheduleRule, StartDate, StartTime};
pub use tags::{Month, MonthDay, Occurrence, TagError, Weekday};

pub const STORAGE_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ensure::Present => f.write_str("present"),
            Ensure::Absent => f.write_str("absent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage space `{0}` is not a percentage between 0% and 100%")]
pub struct PercentError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Scalar", into = "String")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub fn new(value: u8) -> Result<Self, PercentError> {
        if value <= 100 {
            Ok(Percent(value))
        } else {
            Err(PercentError(value.to_string()))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl FromStr for Percent {
    type Err = PercentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value.trim().trim_end_matches('%').trim();
        digits
            .parse::<u8>()
            .ok()
            .and_then(|v| Percent::new(v).ok())
            .ok_or_else(|| PercentError(value.to_string()))
    }
}

impl TryFrom<Scalar> for Percent {
    type Error = PercentError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        value.to_string().parse()
    }
}

impl From<Percent> for String {
    fn from(value: Percent) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A drive's snapshot schedule, or `absent` when no readable task exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRepr", into = "ScheduleRepr")]
pub enum Schedule {
    Absent,
    Rules(Vec<ScheduleRule>),
}

impl Schedule {
    pub fn rules(&self) -> Option<&[ScheduleRule]> {
        match self {
            Schedule::Absent => None,
            Schedule::Rules(rules) => Some(rules),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScheduleRepr {
    Marker(String),
    Rules(Vec<ScheduleRule>),
}

impl TryFrom<ScheduleRepr> for Schedule {
    type Error = String;

    fn try_from(value: ScheduleRepr) -> Result<Self, Self::Error> {
        match value {
            ScheduleRepr::Marker(marker) if marker == "absent" => Ok(Schedule::Absent),
            ScheduleRepr::Marker(other) => Err(format!("unknown schedule marker `{}`", other)),
            ScheduleRepr::Rules(rules) => Ok(Schedule::Rules(rules)),
        }
    }
}

impl From<Schedule> for ScheduleRepr {
    fn from(value: Schedule) -> Self {
        match value {
            Schedule::Absent => ScheduleRepr::Marker("absent".to_string()),
            Schedule::Rules(rules) => ScheduleRepr::Rules(rules),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub name: String,
    pub drive_id: String,
    pub storage_volume: Option<String>,
    pub storage_id: Option<String>,
    pub storage_space: Percent,
    pub schedule: Schedule,
    pub ensure: Ensure,
}

impl StorageRecord {
    pub fn task_name(&self) -> String {
        snapshot_task_name(&self.drive_id)
    }
}

/// Name of the scheduled task Windows creates for a volume's snapshots.
pub fn snapshot_task_name(drive_id: &str) -> String {
    format!("ShadowCopyVolume{{{}}}.job", drive_id)
}

/// Upper-cases a drive name and strips the `:` / `:\` suffix users tend to add.
pub fn normalize_drive_name(value: &str) -> String {
    value
        .trim()
        .trim_end_matches('\\')
        .trim_end_matches(':')
        .to_ascii_uppercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_space: Option<Percent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<OneOrMany<RuleDecl>>,
}

impl ResourceSpec {
    pub fn desired_schedule(&self) -> Result<Option<Vec<ScheduleRule>>, RuleError> {
        let Some(schedule) = &self.schedule else {
            return Ok(None);
        };
        schedule
            .iter()
            .cloned()
            .map(ScheduleRule::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
