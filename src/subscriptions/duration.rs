use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use thiserror::Error;

/// key: duration-parser -> plan duration strings into end instants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration `{0}`: expected `<integer> <unit>`")]
    InvalidFormat(String),
    #[error("unsupported duration unit `{0}`")]
    UnsupportedUnit(String),
    #[error("duration `{0}` moves the end date out of range")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Day => "day",
            DurationUnit::Week => "week",
            DurationUnit::Month => "month",
            DurationUnit::Year => "year",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "day" | "days" => Some(DurationUnit::Day),
            "week" | "weeks" => Some(DurationUnit::Week),
            "month" | "months" => Some(DurationUnit::Month),
            "year" | "years" => Some(DurationUnit::Year),
            _ => None,
        }
    }
}

/// Parsed form of a plan duration such as `"3 months"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSpec {
    pub amount: u32,
    pub unit: DurationUnit,
}

impl DurationSpec {
    /// Returns `None` when the result falls outside chrono's representable range.
    ///
    /// Month and year arithmetic clamps to the last valid day of the target
    /// month: Jan 31 + 1 month lands on Feb 29 in a leap year, Feb 28 otherwise.
    pub fn end_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let amount = i64::from(self.amount);
        match self.unit {
            DurationUnit::Day => start.checked_add_signed(Duration::days(amount)),
            DurationUnit::Week => start.checked_add_signed(Duration::weeks(amount)),
            DurationUnit::Month => start.checked_add_months(Months::new(self.amount)),
            DurationUnit::Year => self
                .amount
                .checked_mul(12)
                .and_then(|months| start.checked_add_months(Months::new(months))),
        }
    }
}

impl FromStr for DurationSpec {
    type Err = DurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DurationError::InvalidFormat(value.to_string());
        let mut tokens = value.split_whitespace();
        let amount_token = tokens.next().ok_or_else(invalid)?;
        let amount = amount_token.parse::<u32>().map_err(|_| invalid())?;
        let unit_token = tokens.next().ok_or_else(invalid)?;
        if tokens.next().is_some() {
            return Err(invalid());
        }
        let unit = DurationUnit::parse(unit_token)
            .ok_or_else(|| DurationError::UnsupportedUnit(unit_token.to_string()))?;
        Ok(DurationSpec { amount, unit })
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.amount == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.amount, self.unit.as_str(), suffix)
    }
}

/// Derives the end instant of a subscription period starting at `start`.
pub fn apply(start: DateTime<Utc>, spec: &str) -> Result<DateTime<Utc>, DurationError> {
    let parsed: DurationSpec = spec.parse()?;
    parsed
        .end_from(start)
        .ok_or_else(|| DurationError::OutOfRange(spec.to_string()))
}
