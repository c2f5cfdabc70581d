//! Task Scheduler 1.0 trigger payloads and their conversion to and from
//! [`ScheduleRule`].
//!
//! The raw layout mirrors `TASK_TRIGGER` from `mstask.h`: a kind constant, a
//! start date and time, a flag word and a kind-specific union. Every
//! enum-to-bit mapping below is an exhaustive `match`, so adding a tag variant
//! fails to compile until its encoding is written down.

use std::collections::BTreeSet;
use thiserror::Error;
use vss_core::{
    Month, MonthDay, Occurrence, Recurrence, ScheduleKind, ScheduleRule, StartDate, StartTime,
    Weekday,
};

pub const TASK_TIME_TRIGGER_ONCE: u32 = 0;
pub const TASK_TIME_TRIGGER_DAILY: u32 = 1;
pub const TASK_TIME_TRIGGER_WEEKLY: u32 = 2;
pub const TASK_TIME_TRIGGER_MONTHLYDATE: u32 = 3;
pub const TASK_TIME_TRIGGER_MONTHLYDOW: u32 = 4;
pub const TASK_EVENT_TRIGGER_ON_IDLE: u32 = 5;
pub const TASK_EVENT_TRIGGER_AT_SYSTEMSTART: u32 = 6;
pub const TASK_EVENT_TRIGGER_AT_LOGON: u32 = 7;

pub const TASK_TRIGGER_FLAG_HAS_END_DATE: u32 = 0x1;
pub const TASK_TRIGGER_FLAG_KILL_AT_DURATION_END: u32 = 0x2;
pub const TASK_TRIGGER_FLAG_DISABLED: u32 = 0x4;

pub const TASK_FIRST_WEEK: u16 = 1;
pub const TASK_SECOND_WEEK: u16 = 2;
pub const TASK_THIRD_WEEK: u16 = 3;
pub const TASK_FOURTH_WEEK: u16 = 4;
pub const TASK_LAST_WEEK: u16 = 5;

const ALL_WEEKDAYS: u16 = 0x7F;
const ALL_MONTHS: u16 = 0x0FFF;
const LAST_DAY_BIT: u32 = 1 << 31;

/// Kind-specific trigger fields. Only the ones matching `trigger_type` are
/// meaningful; the rest stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerData {
    pub days_interval: u16,
    pub weeks_interval: u16,
    pub days_of_week: u16,
    pub days: u32,
    pub months: u16,
    pub which_week: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTrigger {
    pub begin_year: u16,
    pub begin_month: u16,
    pub begin_day: u16,
    pub end_year: u16,
    pub end_month: u16,
    pub end_day: u16,
    pub start_hour: u16,
    pub start_minute: u16,
    pub minutes_duration: u32,
    pub minutes_interval: u32,
    pub flags: u32,
    pub trigger_type: u32,
    pub data: TriggerData,
    pub random_minutes_interval: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("trigger type {0} is not supported")]
    UnsupportedKind(u32),
    #[error("week-of-month code {0} is not recognised")]
    UnknownOccurrence(u16),
    #[error("start date {year}-{month}-{day} is not a calendar date")]
    StartDate { year: u16, month: u16, day: u16 },
    #[error("start time {hour}:{minute} is not a clock time")]
    StartTime { hour: u16, minute: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenormalizeError {
    #[error("a start time is required to create a {0} trigger")]
    MissingStartTime(ScheduleKind),
    #[error("start date {0} cannot be stored in a trigger")]
    StartDate(StartDate),
}

fn kind_code(kind: ScheduleKind) -> u32 {
    match kind {
        ScheduleKind::Once => TASK_TIME_TRIGGER_ONCE,
        ScheduleKind::Daily => TASK_TIME_TRIGGER_DAILY,
        ScheduleKind::Weekly => TASK_TIME_TRIGGER_WEEKLY,
        ScheduleKind::MonthlyByDate => TASK_TIME_TRIGGER_MONTHLYDATE,
        ScheduleKind::MonthlyByWeekday => TASK_TIME_TRIGGER_MONTHLYDOW,
    }
}

fn weekday_bit(day: Weekday) -> u16 {
    match day {
        Weekday::Sun => 0x01,
        Weekday::Mon => 0x02,
        Weekday::Tues => 0x04,
        Weekday::Wed => 0x08,
        Weekday::Thurs => 0x10,
        Weekday::Fri => 0x20,
        Weekday::Sat => 0x40,
    }
}

fn month_bit(month: Month) -> u16 {
    match month {
        Month::Jan => 0x0001,
        Month::Feb => 0x0002,
        Month::Mar => 0x0004,
        Month::Apr => 0x0008,
        Month::May => 0x0010,
        Month::Jun => 0x0020,
        Month::Jul => 0x0040,
        Month::Aug => 0x0080,
        Month::Sep => 0x0100,
        Month::Oct => 0x0200,
        Month::Nov => 0x0400,
        Month::Dec => 0x0800,
    }
}

fn occurrence_code(occurrence: Occurrence) -> u16 {
    match occurrence {
        Occurrence::First => TASK_FIRST_WEEK,
        Occurrence::Second => TASK_SECOND_WEEK,
        Occurrence::Third => TASK_THIRD_WEEK,
        Occurrence::Fourth => TASK_FOURTH_WEEK,
        Occurrence::Last => TASK_LAST_WEEK,
    }
}

fn month_day_bit(day: MonthDay) -> u32 {
    match day {
        MonthDay::Day(day) => 1u32 << (u32::from(day.clamp(1, 31)) - 1),
        MonthDay::Last => LAST_DAY_BIT,
    }
}

pub fn weekdays_from_bits(bits: u16) -> BTreeSet<Weekday> {
    Weekday::ALL
        .into_iter()
        .filter(|day| bits & weekday_bit(*day) != 0)
        .collect()
}

pub fn weekdays_to_bits(days: &BTreeSet<Weekday>) -> u16 {
    days.iter().fold(0, |bits, day| bits | weekday_bit(*day))
}

/// Each set bit decodes to its month on its own; unknown high bits are ignored.
pub fn months_from_bits(bits: u16) -> BTreeSet<Month> {
    Month::ALL
        .into_iter()
        .filter(|month| bits & month_bit(*month) != 0)
        .collect()
}

pub fn months_to_bits(months: &BTreeSet<Month>) -> u16 {
    months.iter().fold(0, |bits, month| bits | month_bit(*month))
}

pub fn month_days_from_bits(bits: u32) -> BTreeSet<MonthDay> {
    let mut days: BTreeSet<MonthDay> = (1..=31u8)
        .filter(|day| bits & month_day_bit(MonthDay::Day(*day)) != 0)
        .map(MonthDay::Day)
        .collect();
    if bits & LAST_DAY_BIT != 0 {
        days.insert(MonthDay::Last);
    }
    days
}

pub fn month_days_to_bits(days: &BTreeSet<MonthDay>) -> u32 {
    days.iter().fold(0, |bits, day| bits | month_day_bit(*day))
}

pub fn occurrence_from_code(code: u16) -> Option<Occurrence> {
    Occurrence::ALL
        .into_iter()
        .find(|occurrence| occurrence_code(*occurrence) == code)
}

pub fn normalize(raw: &RawTrigger, index: usize) -> Result<ScheduleRule, NormalizeError> {
    let data = &raw.data;
    let recurrence = match raw.trigger_type {
        TASK_TIME_TRIGGER_ONCE => Recurrence::Once,
        TASK_TIME_TRIGGER_DAILY => Recurrence::Daily {
            every: Some(data.days_interval),
        },
        TASK_TIME_TRIGGER_WEEKLY => Recurrence::Weekly {
            every: Some(data.weeks_interval),
            days_of_week: Some(weekdays_from_bits(data.days_of_week)),
        },
        TASK_TIME_TRIGGER_MONTHLYDATE => Recurrence::MonthlyByDate {
            months: Some(months_from_bits(data.months)),
            on: month_days_from_bits(data.days),
        },
        TASK_TIME_TRIGGER_MONTHLYDOW => Recurrence::MonthlyByWeekday {
            months: Some(months_from_bits(data.months)),
            which_occurrence: occurrence_from_code(data.which_week)
                .ok_or(NormalizeError::UnknownOccurrence(data.which_week))?,
            days_of_week: weekdays_from_bits(data.days_of_week),
        },
        other => return Err(NormalizeError::UnsupportedKind(other)),
    };

    let start_date = start_date_of(raw).ok_or(NormalizeError::StartDate {
        year: raw.begin_year,
        month: raw.begin_month,
        day: raw.begin_day,
    })?;
    let start_time = start_time_of(raw).ok_or(NormalizeError::StartTime {
        hour: raw.start_hour,
        minute: raw.start_minute,
    })?;

    Ok(ScheduleRule {
        recurrence,
        start_date: Some(start_date),
        start_time: Some(start_time),
        enabled: raw.flags & TASK_TRIGGER_FLAG_DISABLED == 0,
        minutes_interval: raw.minutes_interval,
        minutes_duration: raw.minutes_duration,
        index: Some(index),
    })
}

fn start_date_of(raw: &RawTrigger) -> Option<StartDate> {
    let month = u8::try_from(raw.begin_month).ok()?;
    let day = u8::try_from(raw.begin_day).ok()?;
    StartDate::from_ymd(i32::from(raw.begin_year), month, day).ok()
}

fn start_time_of(raw: &RawTrigger) -> Option<StartTime> {
    let hour = u8::try_from(raw.start_hour).ok()?;
    let minute = u8::try_from(raw.start_minute).ok()?;
    StartTime::from_hm(hour, minute).ok()
}

/// Builds the payload for a new trigger. Unset optional fields fall back to
/// `today`, an interval of 1, every weekday and every month.
pub fn denormalize(rule: &ScheduleRule, today: StartDate) -> Result<RawTrigger, DenormalizeError> {
    let time = rule
        .start_time
        .ok_or(DenormalizeError::MissingStartTime(rule.kind()))?;
    let date = rule.start_date.unwrap_or(today);
    let begin_year = u16::try_from(date.year()).map_err(|_| DenormalizeError::StartDate(date))?;

    let mut raw = RawTrigger {
        begin_year,
        begin_month: u16::from(date.month()),
        begin_day: u16::from(date.day()),
        start_hour: u16::from(time.hour()),
        start_minute: u16::from(time.minute()),
        minutes_duration: rule.minutes_duration,
        minutes_interval: rule.minutes_interval,
        flags: if rule.enabled { 0 } else { TASK_TRIGGER_FLAG_DISABLED },
        trigger_type: kind_code(rule.kind()),
        ..RawTrigger::default()
    };

    match &rule.recurrence {
        Recurrence::Once => {}
        Recurrence::Daily { every } => raw.data.days_interval = every.unwrap_or(1),
        Recurrence::Weekly { every, days_of_week } => {
            raw.data.weeks_interval = every.unwrap_or(1);
            raw.data.days_of_week = days_of_week.as_ref().map_or(ALL_WEEKDAYS, weekdays_to_bits);
        }
        Recurrence::MonthlyByDate { months, on } => {
            raw.data.months = months.as_ref().map_or(ALL_MONTHS, months_to_bits);
            raw.data.days = month_days_to_bits(on);
        }
        Recurrence::MonthlyByWeekday {
            months,
            which_occurrence,
            days_of_week,
        } => {
            raw.data.months = months.as_ref().map_or(ALL_MONTHS, months_to_bits);
            raw.data.which_week = occurrence_code(*which_occurrence);
            raw.data.days_of_week = weekdays_to_bits(days_of_week);
        }
    }

    Ok(raw)
}
