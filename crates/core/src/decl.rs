use crate::rule::{Recurrence, RuleError, ScheduleRule, StartDate, StartTime};
use crate::tags::{Month, MonthDay, TagError, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A YAML/JSON scalar that may be written either as a number or as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(value) => write!(f, "{}", value),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value).iter(),
            OneOrMany::Many(values) => values.iter(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDecl {
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<OneOrMany<Scalar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<OneOrMany<Scalar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<OneOrMany<Scalar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub which_occurrence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

fn reject<T>(value: &Option<T>, field: &'static str, schedule: &'static str) -> Result<(), RuleError> {
    match value {
        Some(_) => Err(RuleError::Field { field, schedule }),
        None => Ok(()),
    }
}

fn parse_every(value: &Option<Scalar>) -> Result<Option<u16>, RuleError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let every = value
        .to_string()
        .trim()
        .parse::<u16>()
        .map_err(|_| RuleError::Number {
            field: "every",
            value: value.to_string(),
        })?;
    if every == 0 {
        return Err(RuleError::Interval);
    }
    Ok(Some(every))
}

fn parse_set<T>(value: &Option<OneOrMany<Scalar>>, field: &'static str) -> Result<Option<BTreeSet<T>>, RuleError>
where
    T: FromStr<Err = TagError> + Ord,
{
    let Some(values) = value else {
        return Ok(None);
    };
    let set = values
        .iter()
        .map(|item| item.to_string().parse::<T>())
        .collect::<Result<BTreeSet<T>, TagError>>()?;
    if set.is_empty() {
        return Err(RuleError::Empty(field));
    }
    Ok(Some(set))
}

fn tags<T: ToString, I: IntoIterator<Item = T>>(values: I) -> OneOrMany<Scalar> {
    OneOrMany::Many(values.into_iter().map(|v| Scalar::Text(v.to_string())).collect())
}

impl TryFrom<RuleDecl> for ScheduleRule {
    type Error = RuleError;

    fn try_from(decl: RuleDecl) -> Result<Self, Self::Error> {
        let recurrence = match decl.schedule.trim().to_ascii_lowercase().as_str() {
            "daily" => {
                reject(&decl.day_of_week, "day_of_week", "daily")?;
                reject(&decl.months, "months", "daily")?;
                reject(&decl.on, "on", "daily")?;
                reject(&decl.which_occurrence, "which_occurrence", "daily")?;
                Recurrence::Daily {
                    every: parse_every(&decl.every)?,
                }
            }
            "weekly" => {
                reject(&decl.months, "months", "weekly")?;
                reject(&decl.on, "on", "weekly")?;
                reject(&decl.which_occurrence, "which_occurrence", "weekly")?;
                Recurrence::Weekly {
                    every: parse_every(&decl.every)?,
                    days_of_week: parse_set::<Weekday>(&decl.day_of_week, "day_of_week")?,
                }
            }
            "monthly" => {
                reject(&decl.every, "every", "monthly")?;
                let months = parse_set::<Month>(&decl.months, "months")?;
                match (&decl.on, &decl.which_occurrence) {
                    (Some(_), None) => {
                        reject(&decl.day_of_week, "day_of_week", "monthly-by-date")?;
                        Recurrence::MonthlyByDate {
                            months,
                            on: parse_set::<MonthDay>(&decl.on, "on")?.ok_or(RuleError::Empty("on"))?,
                        }
                    }
                    (None, Some(which)) => Recurrence::MonthlyByWeekday {
                        months,
                        which_occurrence: which.parse()?,
                        days_of_week: parse_set::<Weekday>(&decl.day_of_week, "day_of_week")?
                            .ok_or(RuleError::MissingDayOfWeek)?,
                    },
                    _ => return Err(RuleError::MonthlyShape),
                }
            }
            "once" => {
                reject(&decl.every, "every", "once")?;
                reject(&decl.day_of_week, "day_of_week", "once")?;
                reject(&decl.months, "months", "once")?;
                reject(&decl.on, "on", "once")?;
                reject(&decl.which_occurrence, "which_occurrence", "once")?;
                Recurrence::Once
            }
            _ => return Err(RuleError::Schedule(decl.schedule.clone())),
        };

        Ok(ScheduleRule {
            recurrence,
            start_date: decl.start_date.as_deref().map(str::parse::<StartDate>).transpose()?,
            start_time: decl.start_time.as_deref().map(str::parse::<StartTime>).transpose()?,
            enabled: decl.enabled.unwrap_or(true),
            minutes_interval: decl.minutes_interval.unwrap_or(0),
            minutes_duration: decl.minutes_duration.unwrap_or(0),
            index: decl.index,
        })
    }
}

impl From<ScheduleRule> for RuleDecl {
    fn from(rule: ScheduleRule) -> Self {
        let mut decl = RuleDecl {
            start_date: rule.start_date.map(|date| date.to_string()),
            start_time: rule.start_time.map(|time| time.to_string()),
            enabled: Some(rule.enabled),
            minutes_interval: (rule.minutes_interval != 0).then_some(rule.minutes_interval),
            minutes_duration: (rule.minutes_duration != 0).then_some(rule.minutes_duration),
            index: rule.index,
            ..RuleDecl::default()
        };
        match rule.recurrence {
            Recurrence::Daily { every } => {
                decl.schedule = "daily".to_string();
                decl.every = every.map(|v| Scalar::Int(v.into()));
            }
            Recurrence::Weekly { every, days_of_week } => {
                decl.schedule = "weekly".to_string();
                decl.every = every.map(|v| Scalar::Int(v.into()));
                decl.day_of_week = days_of_week.map(tags);
            }
            Recurrence::MonthlyByDate { months, on } => {
                decl.schedule = "monthly".to_string();
                decl.months = months.map(|set| {
                    OneOrMany::Many(set.into_iter().map(|m| Scalar::Int(m.number().into())).collect())
                });
                decl.on = Some(OneOrMany::Many(
                    on.into_iter()
                        .map(|day| match day {
                            MonthDay::Day(day) => Scalar::Int(day.into()),
                            MonthDay::Last => Scalar::Text("last".to_string()),
                        })
                        .collect(),
                ));
            }
            Recurrence::MonthlyByWeekday {
                months,
                which_occurrence,
                days_of_week,
            } => {
                decl.schedule = "monthly".to_string();
                decl.months = months.map(|set| {
                    OneOrMany::Many(set.into_iter().map(|m| Scalar::Int(m.number().into())).collect())
                });
                decl.which_occurrence = Some(which_occurrence.to_string());
                decl.day_of_week = Some(tags(days_of_week));
            }
            Recurrence::Once => decl.schedule = "once".to_string(),
        }
        decl
    }
}
