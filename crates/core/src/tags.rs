use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("unknown day of week `{0}`")]
    Weekday(String),
    #[error("unknown month `{0}`")]
    Month(String),
    #[error("day of month `{0}` is not 1-31 or `last`")]
    MonthDay(String),
    #[error("unknown occurrence `{0}`")]
    Occurrence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Sun,
    Mon,
    Tues,
    Wed,
    Thurs,
    Fri,
    Sat,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tues,
        Weekday::Wed,
        Weekday::Thurs,
        Weekday::Fri,
        Weekday::Sat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Sun => "sun",
            Weekday::Mon => "mon",
            Weekday::Tues => "tues",
            Weekday::Wed => "wed",
            Weekday::Thurs => "thurs",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
        }
    }
}

impl FromStr for Weekday {
    type Err = TagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sun" | "sunday" => Ok(Weekday::Sun),
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tues" | "tuesday" => Ok(Weekday::Tues),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thurs" | "thursday" => Ok(Weekday::Thurs),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            _ => Err(TagError::Weekday(value.to_string())),
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    pub fn number(self) -> u8 {
        match self {
            Month::Jan => 1,
            Month::Feb => 2,
            Month::Mar => 3,
            Month::Apr => 4,
            Month::May => 5,
            Month::Jun => 6,
            Month::Jul => 7,
            Month::Aug => 8,
            Month::Sep => 9,
            Month::Oct => 10,
            Month::Nov => 11,
            Month::Dec => 12,
        }
    }

    pub fn from_number(number: u8) -> Option<Month> {
        Month::ALL.into_iter().find(|month| month.number() == number)
    }
}

impl FromStr for Month {
    type Err = TagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Month::from_number(number).ok_or_else(|| TagError::Month(value.to_string()));
        }
        let month = match trimmed.to_ascii_lowercase().as_str() {
            "jan" | "january" => Month::Jan,
            "feb" | "february" => Month::Feb,
            "mar" | "march" => Month::Mar,
            "apr" | "april" => Month::Apr,
            "may" => Month::May,
            "jun" | "june" => Month::Jun,
            "jul" | "july" => Month::Jul,
            "aug" | "august" => Month::Aug,
            "sep" | "sept" | "september" => Month::Sep,
            "oct" | "october" => Month::Oct,
            "nov" | "november" => Month::Nov,
            "dec" | "december" => Month::Dec,
            _ => return Err(TagError::Month(value.to_string())),
        };
        Ok(month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A day inside a month-by-date rule. `Last` follows whatever the month length is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MonthDay {
    Day(u8),
    Last,
}

impl MonthDay {
    pub fn day(day: u8) -> Result<MonthDay, TagError> {
        if (1..=31).contains(&day) {
            Ok(MonthDay::Day(day))
        } else {
            Err(TagError::MonthDay(day.to_string()))
        }
    }
}

impl FromStr for MonthDay {
    type Err = TagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("last") {
            return Ok(MonthDay::Last);
        }
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(|day| MonthDay::day(day).ok())
            .ok_or_else(|| TagError::MonthDay(value.to_string()))
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthDay::Day(day) => write!(f, "{}", day),
            MonthDay::Last => f.write_str("last"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Occurrence {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl Occurrence {
    pub const ALL: [Occurrence; 5] = [
        Occurrence::First,
        Occurrence::Second,
        Occurrence::Third,
        Occurrence::Fourth,
        Occurrence::Last,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Occurrence::First => "first",
            Occurrence::Second => "second",
            Occurrence::Third => "third",
            Occurrence::Fourth => "fourth",
            Occurrence::Last => "last",
        }
    }
}

impl FromStr for Occurrence {
    type Err = TagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Occurrence::ALL
            .into_iter()
            .find(|occurrence| value.trim().eq_ignore_ascii_case(occurrence.as_str()))
            .ok_or_else(|| TagError::Occurrence(value.to_string()))
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_accepts_short_aliases() {
        assert_eq!("tue".parse::<Weekday>(), Ok(Weekday::Tues));
        assert_eq!("Thurs".parse::<Weekday>(), Ok(Weekday::Thurs));
        assert_eq!(Weekday::Tues.to_string(), "tues");
        assert!("funday".parse::<Weekday>().is_err());
    }

    #[test]
    fn month_parses_numbers_and_names() {
        assert_eq!("3".parse::<Month>(), Ok(Month::Mar));
        assert_eq!("december".parse::<Month>(), Ok(Month::Dec));
        assert!("13".parse::<Month>().is_err());
        assert!("0".parse::<Month>().is_err());
        for month in Month::ALL {
            assert_eq!(Month::from_number(month.number()), Some(month));
        }
    }

    #[test]
    fn month_names_must_match_whole() {
        assert_eq!("Sept".parse::<Month>(), Ok(Month::Sep));
        assert_eq!("MAR".parse::<Month>(), Ok(Month::Mar));
        assert!("marzipan".parse::<Month>().is_err());
        assert!("janu".parse::<Month>().is_err());
        assert!("decembers".parse::<Month>().is_err());
    }

    #[test]
    fn month_day_range() {
        assert_eq!("last".parse::<MonthDay>(), Ok(MonthDay::Last));
        assert_eq!("31".parse::<MonthDay>(), Ok(MonthDay::Day(31)));
        assert!("32".parse::<MonthDay>().is_err());
        assert!("0".parse::<MonthDay>().is_err());
    }

    #[test]
    fn occurrence_round_trips_through_text() {
        for occurrence in Occurrence::ALL {
            assert_eq!(occurrence.as_str().parse::<Occurrence>(), Ok(occurrence));
        }
    }
}
