use chrono::{DateTime, Days, Local, Months, NaiveDate, Utc};
use rusqlite::Row;
use usage_core::{LogEntry, ProcessedFile, TokenCounts};

use crate::types::UsageRow;

fn get_u64(row: &Row<'_>, index: usize) -> std::result::Result<u64, rusqlite::Error> {
    Ok(row.get::<_, i64>(index)?.max(0) as u64)
}

pub(crate) fn row_to_processed_file(
    row: &Row<'_>,
) -> std::result::Result<ProcessedFile, rusqlite::Error> {
    Ok(ProcessedFile {
        file_path: row.get(0)?,
        last_modified_at: row.get(1)?,
        last_size: get_u64(row, 2)?,
        last_line_count: get_u64(row, 3)?,
        processed_at: row.get(4)?,
    })
}

pub(crate) fn row_to_log_entry(row: &Row<'_>) -> std::result::Result<LogEntry, rusqlite::Error> {
    Ok(LogEntry {
        uuid: row.get(0)?,
        session_id: row.get(1)?,
        project_path: row.get(2)?,
        timestamp: row.get(3)?,
        role: row.get(4)?,
        model: row.get(5)?,
        tokens: TokenCounts {
            input_tokens: get_u64(row, 6)?,
            output_tokens: get_u64(row, 7)?,
            cache_creation_input_tokens: get_u64(row, 8)?,
            cache_read_input_tokens: get_u64(row, 9)?,
        },
        cost_usd: row.get(10)?,
        git_branch: row.get(11)?,
        cwd: row.get(12)?,
        file_path: row.get(13)?,
        file_modified_at: row.get(14)?,
    })
}

pub(crate) fn row_to_usage_row(row: &Row<'_>) -> std::result::Result<UsageRow, rusqlite::Error> {
    Ok(UsageRow {
        timestamp: row.get(0)?,
        session_id: row.get(1)?,
        tokens: TokenCounts {
            input_tokens: get_u64(row, 2)?,
            output_tokens: get_u64(row, 3)?,
            cache_creation_input_tokens: get_u64(row, 4)?,
            cache_read_input_tokens: get_u64(row, 5)?,
        },
        cost_usd: row.get(6)?,
    })
}

pub(crate) fn local_time(timestamp_ms: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(&Local)
}

pub(crate) fn local_date(timestamp_ms: i64) -> String {
    local_time(timestamp_ms).format("%Y-%m-%d").to_string()
}

pub(crate) fn local_month(timestamp_ms: i64) -> String {
    local_time(timestamp_ms).format("%Y-%m").to_string()
}

pub(crate) fn within(value: &str, start: Option<&str>, end: Option<&str>) -> bool {
    if let Some(start) = start
        && value < start
    {
        return false;
    }
    if let Some(end) = end
        && value > end
    {
        return false;
    }
    true
}

// Local offsets stay within a day of UTC, so padding a calendar range by one
// day on each side gives a timestamp window that cannot drop matching rows.
fn padded_ms(date: NaiveDate, pad_back: bool) -> Option<i64> {
    let padded = if pad_back {
        date.checked_sub_days(Days::new(1))?
    } else {
        date.checked_add_days(Days::new(1))?
    };
    Some(padded.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// Coarse `[start, end)` millisecond bounds around an inclusive date range.
pub(crate) fn date_range_ms(start: Option<&str>, end: Option<&str>) -> (Option<i64>, Option<i64>) {
    let parse = |raw: &str| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok();
    let start_ms = start.and_then(parse).and_then(|date| padded_ms(date, true));
    let end_ms = end
        .and_then(parse)
        .and_then(|date| date.checked_add_days(Days::new(1)))
        .and_then(|date| padded_ms(date, false));
    (start_ms, end_ms)
}

/// Coarse `[start, end)` millisecond bounds around an inclusive month range.
pub(crate) fn month_range_ms(start: Option<&str>, end: Option<&str>) -> (Option<i64>, Option<i64>) {
    let parse = |raw: &str| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok();
    let start_ms = start.and_then(parse).and_then(|date| padded_ms(date, true));
    let end_ms = end
        .and_then(parse)
        .and_then(|date| date.checked_add_months(Months::new(1)))
        .and_then(|date| padded_ms(date, false));
    (start_ms, end_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_ms(year: i32, month: u32, day: u32) -> i64 {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid date")
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn date_range_is_padded_by_a_day() {
        let (start, end) = date_range_ms(Some("2025-03-10"), Some("2025-03-12"));
        assert_eq!(start, Some(utc_ms(2025, 3, 9)));
        assert_eq!(end, Some(utc_ms(2025, 3, 14)));
    }

    #[test]
    fn month_range_covers_whole_months() {
        let (start, end) = month_range_ms(Some("2025-01"), Some("2025-12"));
        assert_eq!(start, Some(utc_ms(2024, 12, 31)));
        assert_eq!(end, Some(utc_ms(2026, 1, 2)));
    }

    #[test]
    fn open_or_malformed_bounds_are_unbounded() {
        assert_eq!(date_range_ms(None, None), (None, None));
        assert_eq!(month_range_ms(Some("soon"), None), (None, None));
    }
}
