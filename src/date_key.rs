use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar month used as the temporal group and join key.
///
/// Two keys are equal when year and month match; ordering is chronological
/// (the derived ordering compares `year` first, then `month`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "DateKeyFields")]
pub struct DateKey {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct DateKeyFields {
    year: i32,
    month: u32,
}

impl TryFrom<DateKeyFields> for DateKey {
    type Error = DateKeyError;

    fn try_from(fields: DateKeyFields) -> Result<Self, Self::Error> {
        DateKey::new(fields.year, fields.month)
    }
}

impl DateKey {
    /// Creates a new DateKey.
    ///
    /// # Errors
    /// Returns `DateKeyError::InvalidMonth` if `month` is not within 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, DateKeyError> {
        if !(1..=12).contains(&month) {
            return Err(DateKeyError::InvalidMonth(month));
        }
        Ok(DateKey { year, month })
    }

    /// Builds a key from a month already known to be within 1..=12.
    pub(crate) const fn from_valid_month(year: i32, month: u32) -> Self {
        DateKey { year, month }
    }

    /// Truncates a calendar date to its month.
    pub fn from_date(date: NaiveDate) -> Self {
        DateKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    /// Parses `YYYY-MM`, ignoring any trailing day component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateFormat::YearMonth
            .parse(s)
            .ok_or_else(|| DateKeyError::Unparsable(s.to_string()))
    }
}

/// Source format used to turn a raw date string into a [`DateKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormat {
    /// `yyyy-MM`; longer values such as `2010-01-04` are truncated to the month
    YearMonth,
    /// `yyyy-MM-dd`
    YearMonthDay,
    /// `yyyy`, mapped to January of that year
    Year,
    /// Any chrono format string; patterns without a day of month are read
    /// as the first day
    Pattern(String),
}

impl DateFormat {
    /// Maps a Spark-style date pattern onto a format.
    ///
    /// # Errors
    /// Returns `DateKeyError::UnsupportedPattern` for patterns other than
    /// `yyyy-MM`, `yyyy-MM-dd` and `yyyy`.
    pub fn from_pattern(pattern: &str) -> Result<Self, DateKeyError> {
        match pattern.trim() {
            "yyyy-MM" => Ok(DateFormat::YearMonth),
            "yyyy-MM-dd" => Ok(DateFormat::YearMonthDay),
            "yyyy" => Ok(DateFormat::Year),
            other => Err(DateKeyError::UnsupportedPattern(other.to_string())),
        }
    }

    /// Parses a raw value, returning `None` when it does not match.
    pub fn parse(&self, raw: &str) -> Option<DateKey> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match self {
            DateFormat::YearMonth => {
                let mut parts = trimmed.splitn(3, '-');
                let year = parse_year(parts.next()?)?;
                // Anything after the month (a day, a time) is truncated away
                let month_part = parts.next()?;
                if month_part.is_empty()
                    || month_part.len() > 2
                    || !month_part.chars().all(|c| c.is_ascii_digit())
                {
                    return None;
                }
                let month = month_part.parse::<u32>().ok()?;
                NaiveDate::from_ymd_opt(year, month, 1).map(DateKey::from_date)
            }
            DateFormat::YearMonthDay => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(DateKey::from_date),
            DateFormat::Year => {
                let year = parse_year(trimmed)?;
                Some(DateKey { year, month: 1 })
            }
            DateFormat::Pattern(pattern) => NaiveDate::parse_from_str(trimmed, pattern)
                .or_else(|_| {
                    NaiveDate::parse_from_str(&format!("{} 1", trimmed), &format!("{} %d", pattern))
                })
                .ok()
                .map(DateKey::from_date),
        }
    }
}

fn parse_year(value: &str) -> Option<i32> {
    if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse::<i32>().ok()
}

/// Errors that can occur when creating or parsing date keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateKeyError {
    /// Month outside 1..=12
    InvalidMonth(u32),
    /// Value did not match the expected format
    Unparsable(String),
    /// Date pattern is not supported
    UnsupportedPattern(String),
}

impl fmt::Display for DateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateKeyError::InvalidMonth(month) => write!(f, "Invalid month: {}", month),
            DateKeyError::Unparsable(value) => write!(f, "Unparsable date: '{}'", value),
            DateKeyError::UnsupportedPattern(pattern) => {
                write!(f, "Unsupported date pattern: '{}'", pattern)
            }
        }
    }
}

impl std::error::Error for DateKeyError {}

impl From<DateKeyError> for crate::error::PipelineError {
    fn from(err: DateKeyError) -> Self {
        match err {
            DateKeyError::UnsupportedPattern(_) => {
                crate::error::PipelineError::InvalidDateFormat(err.to_string())
            }
            _ => crate::error::PipelineError::InvalidDateRange(err.to_string()),
        }
    }
}
