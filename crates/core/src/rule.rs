use crate::decl::RuleDecl;
use crate::tags::{Month, MonthDay, Occurrence, TagError, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::format_description::FormatItem;
use time::macros::format_description;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error("invalid start date `{0}` (expected YYYY-M-D)")]
    StartDate(String),
    #[error("invalid start time `{0}` (expected HH:MM)")]
    StartTime(String),
    #[error("unknown schedule `{0}` (expected daily, weekly, monthly or once)")]
    Schedule(String),
    #[error("`{field}` is not valid for a {schedule} schedule")]
    Field {
        field: &'static str,
        schedule: &'static str,
    },
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{field}` value `{value}` is not a valid number")]
    Number { field: &'static str, value: String },
    #[error("`every` must be at least 1")]
    Interval,
    #[error("a monthly schedule needs exactly one of `on` or `which_occurrence`")]
    MonthlyShape,
    #[error("`which_occurrence` requires `day_of_week`")]
    MissingDayOfWeek,
}

/// Trigger start date, rendered as `YYYY-M-D` without zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StartDate(time::Date);

impl StartDate {
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self, RuleError> {
        let invalid = || RuleError::StartDate(format!("{}-{}-{}", year, month, day));
        let month = time::Month::try_from(month).map_err(|_| invalid())?;
        time::Date::from_calendar_date(year, month, day)
            .map(StartDate)
            .map_err(|_| invalid())
    }

    pub fn from_date(date: time::Date) -> Self {
        StartDate(date)
    }

    /// Current UTC calendar date.
    pub fn today() -> Self {
        StartDate(time::OffsetDateTime::now_utc().date())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u8 {
        u8::from(self.0.month())
    }

    pub fn day(&self) -> u8 {
        self.0.day()
    }
}

const START_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month padding:none]-[day padding:none]");

impl FromStr for StartDate {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        time::Date::parse(value.trim(), START_DATE_FORMAT)
            .map(StartDate)
            .map_err(|_| RuleError::StartDate(value.to_string()))
    }
}

impl fmt::Display for StartDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.format(START_DATE_FORMAT).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Trigger start time on a 24-hour clock, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StartTime(time::Time);

impl StartTime {
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, RuleError> {
        time::Time::from_hms(hour, minute, 0)
            .map(StartTime)
            .map_err(|_| RuleError::StartTime(format!("{}:{}", hour, minute)))
    }

    pub fn hour(&self) -> u8 {
        self.0.hour()
    }

    pub fn minute(&self) -> u8 {
        self.0.minute()
    }
}

impl FromStr for StartTime {
    type Err = RuleError;

    /// Accepts `H:MM`, `HH:MM`, `HH:MM:SS` and a trailing `am`/`pm`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || RuleError::StartTime(value.to_string());
        let lower = value.trim().to_ascii_lowercase();
        let (clock, pm) = if let Some(rest) = lower.strip_suffix("pm") {
            (rest.trim_end(), Some(true))
        } else if let Some(rest) = lower.strip_suffix("am") {
            (rest.trim_end(), Some(false))
        } else {
            (lower.as_str(), None)
        };

        let mut parts = clock.split(':');
        let hour = parts.next().and_then(|v| v.parse::<u8>().ok()).ok_or_else(invalid)?;
        let minute = parts.next().and_then(|v| v.parse::<u8>().ok()).ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            seconds.parse::<u8>().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        let hour = match pm {
            Some(_) if hour == 0 || hour > 12 => return Err(invalid()),
            Some(true) => hour % 12 + 12,
            Some(false) => hour % 12,
            None => hour,
        };
        StartTime::from_hm(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleKind {
    Daily,
    Weekly,
    MonthlyByDate,
    MonthlyByWeekday,
    Once,
}

impl ScheduleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::MonthlyByDate => "monthly-by-date",
            ScheduleKind::MonthlyByWeekday => "monthly-by-weekday",
            ScheduleKind::Once => "once",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific part of a rule. `None` fields were left unset in a declared
/// rule; rules read back from the scheduler always have them filled in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Recurrence {
    Daily {
        every: Option<u16>,
    },
    Weekly {
        every: Option<u16>,
        days_of_week: Option<BTreeSet<Weekday>>,
    },
    MonthlyByDate {
        months: Option<BTreeSet<Month>>,
        on: BTreeSet<MonthDay>,
    },
    MonthlyByWeekday {
        months: Option<BTreeSet<Month>>,
        which_occurrence: Occurrence,
        days_of_week: BTreeSet<Weekday>,
    },
    Once,
}

impl Recurrence {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Recurrence::Daily { .. } => ScheduleKind::Daily,
            Recurrence::Weekly { .. } => ScheduleKind::Weekly,
            Recurrence::MonthlyByDate { .. } => ScheduleKind::MonthlyByDate,
            Recurrence::MonthlyByWeekday { .. } => ScheduleKind::MonthlyByWeekday,
            Recurrence::Once => ScheduleKind::Once,
        }
    }

    fn satisfies(&self, desired: &Recurrence) -> bool {
        use Recurrence::*;
        match (self, desired) {
            (Daily { every: have }, Daily { every: want }) => unset_or_equal(have, want),
            (
                Weekly { every: have_every, days_of_week: have_days },
                Weekly { every: want_every, days_of_week: want_days },
            ) => unset_or_equal(have_every, want_every) && unset_or_equal(have_days, want_days),
            (
                MonthlyByDate { months: have_months, on: have_on },
                MonthlyByDate { months: want_months, on: want_on },
            ) => unset_or_equal(have_months, want_months) && have_on == want_on,
            (
                MonthlyByWeekday {
                    months: have_months,
                    which_occurrence: have_week,
                    days_of_week: have_days,
                },
                MonthlyByWeekday {
                    months: want_months,
                    which_occurrence: want_week,
                    days_of_week: want_days,
                },
            ) => {
                unset_or_equal(have_months, want_months)
                    && have_week == want_week
                    && have_days == want_days
            }
            (Once, Once) => true,
            _ => false,
        }
    }
}

fn unset_or_equal<T: PartialEq>(have: &Option<T>, want: &Option<T>) -> bool {
    match want {
        None => true,
        Some(want) => have.as_ref() == Some(want),
    }
}

/// One recurring trigger of a drive's snapshot task.
///
/// `index` is the trigger's position in the owning task and only matters when
/// deleting; equality ignores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RuleDecl", into = "RuleDecl")]
pub struct ScheduleRule {
    pub recurrence: Recurrence,
    pub start_date: Option<StartDate>,
    pub start_time: Option<StartTime>,
    pub enabled: bool,
    pub minutes_interval: u32,
    pub minutes_duration: u32,
    pub index: Option<usize>,
}

impl ScheduleRule {
    pub fn new(recurrence: Recurrence) -> Self {
        Self {
            recurrence,
            start_date: None,
            start_time: None,
            enabled: true,
            minutes_interval: 0,
            minutes_duration: 0,
            index: None,
        }
    }

    pub fn kind(&self) -> ScheduleKind {
        self.recurrence.kind()
    }

    pub fn starting(mut self, date: Option<StartDate>, time: Option<StartTime>) -> Self {
        self.start_date = date;
        self.start_time = time;
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// True when this (current) rule fulfils `desired`. Fields `desired` left
    /// unset accept any value; everything else, except `index`, must match.
    pub fn satisfies(&self, desired: &ScheduleRule) -> bool {
        self.recurrence.satisfies(&desired.recurrence)
            && unset_or_equal(&self.start_date, &desired.start_date)
            && unset_or_equal(&self.start_time, &desired.start_time)
            && self.enabled == desired.enabled
            && self.minutes_interval == desired.minutes_interval
            && self.minutes_duration == desired.minutes_duration
    }
}

impl PartialEq for ScheduleRule {
    fn eq(&self, other: &Self) -> bool {
        self.recurrence == other.recurrence
            && self.start_date == other.start_date
            && self.start_time == other.start_time
            && self.enabled == other.enabled
            && self.minutes_interval == other.minutes_interval
            && self.minutes_duration == other.minutes_duration
    }
}

impl Eq for ScheduleRule {}
