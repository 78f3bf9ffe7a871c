use chrono::{DateTime, NaiveDate};

use crate::error::{AppError, Result};

/// Validates a `YYYY-MM-DD` calendar date and returns it normalized.
pub fn parse_date(value: &str) -> Result<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|err| AppError::InvalidInput(format!("invalid date {:?}: {}", value, err)))
}

/// Validates a `YYYY-MM` calendar month and returns it normalized.
pub fn parse_month(value: &str) -> Result<String> {
    let value = value.trim();
    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
        .ok()
        .filter(|_| value.len() == 7)
        .map(|date| date.format("%Y-%m").to_string())
        .ok_or_else(|| AppError::InvalidInput(format!("invalid month {:?}", value)))
}

pub fn rfc3339_to_ms(value: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.timestamp_millis())
        .map_err(|err| AppError::InvalidInput(format!("invalid datetime {:?}: {}", value, err)))
}

pub fn parse_optional<T>(
    value: Option<&str>,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Option<T>> {
    value.map(parse).transpose()
}
