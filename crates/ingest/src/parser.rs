use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use usage_core::{LogEntry, TokenCounts, UNKNOWN_ROLE};

use crate::types::{ParsedContent, ScanError};

/// Where a line came from; copied onto every entry it yields.
#[derive(Debug, Clone, Copy)]
pub struct LineSource<'a> {
    pub file_path: &'a str,
    pub project_path: &'a str,
    pub file_modified_at: i64,
}

fn find_string<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

fn non_empty_string(value: &Value, path: &[&str]) -> Option<String> {
    find_string(value, path)
        .map(str::trim)
        .filter(|found| !found.is_empty())
        .map(str::to_string)
}

// Counters are stored as SQLite integers, so they top out at i64::MAX.
const MAX_TOKEN_COUNT: u64 = i64::MAX as u64;

fn token_count(usage: Option<&Value>, key: &str) -> u64 {
    usage
        .and_then(|usage| usage.get(key))
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
        })
        .unwrap_or(0)
        .min(MAX_TOKEN_COUNT)
}

fn parse_timestamp_str(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    if !raw.is_empty()
        && raw.chars().all(|ch| ch.is_ascii_digit())
        && let Ok(value) = raw.parse::<i64>()
    {
        return Some(epoch_to_millis(value));
    }
    None
}

// Ten digits or fewer reads as seconds.
fn epoch_to_millis(value: i64) -> i64 {
    if value.abs() < 10_000_000_000 {
        value.saturating_mul(1000)
    } else {
        value
    }
}

fn representable(timestamp_ms: i64) -> bool {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).is_some()
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    let timestamp = match value.get("timestamp")? {
        Value::String(raw) => parse_timestamp_str(raw),
        Value::Number(number) => number.as_i64().map(epoch_to_millis),
        _ => None,
    }?;
    representable(timestamp).then_some(timestamp)
}

/// Parses one JSONL line into an entry.
///
/// Blank lines yield `Ok(None)`. Anything else that is not a complete record
/// yields a `ScanError` naming the 1-based `line_number`; nothing partial is
/// ever returned.
pub fn parse_line(
    line: &str,
    source: &LineSource<'_>,
    line_number: usize,
) -> Result<Option<LogEntry>, ScanError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let fail = |message: String| ScanError::line(source.file_path, line_number, message);
    let value: Value =
        serde_json::from_str(line).map_err(|err| fail(format!("invalid json: {}", err)))?;
    if !value.is_object() {
        return Err(fail("record is not a JSON object".to_string()));
    }
    let uuid = non_empty_string(&value, &["uuid"]).ok_or_else(|| fail("missing uuid".into()))?;
    let session_id = non_empty_string(&value, &["sessionId"])
        .ok_or_else(|| fail("missing sessionId".into()))?;
    let timestamp = match value.get("timestamp") {
        None | Some(Value::Null) => return Err(fail("missing timestamp".into())),
        Some(_) => parse_timestamp(&value).ok_or_else(|| fail("unparseable timestamp".into()))?,
    };

    let message = value.get("message");
    let usage = message.and_then(|message| message.get("usage"));
    let tokens = TokenCounts {
        input_tokens: token_count(usage, "input_tokens"),
        output_tokens: token_count(usage, "output_tokens"),
        cache_creation_input_tokens: token_count(usage, "cache_creation_input_tokens"),
        cache_read_input_tokens: token_count(usage, "cache_read_input_tokens"),
    };
    let role = non_empty_string(&value, &["message", "role"])
        .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
    let cost_usd = value
        .get("costUSD")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    Ok(Some(LogEntry {
        uuid,
        session_id,
        project_path: source.project_path.to_string(),
        timestamp,
        role,
        model: non_empty_string(&value, &["message", "model"]),
        tokens,
        cost_usd,
        git_branch: non_empty_string(&value, &["gitBranch"]),
        cwd: non_empty_string(&value, &["cwd"]),
        file_path: source.file_path.to_string(),
        file_modified_at: source.file_modified_at,
    }))
}

pub fn parse_content(content: &str, source: &LineSource<'_>) -> ParsedContent {
    parse_content_from_line(content, 0, source)
}

/// Parses `content` skipping its first `start_line` lines.
///
/// A final line without a newline that fails to parse is assumed to still be
/// written: it produces no error and is left out of `line_count` so the next
/// scan reads it again.
pub fn parse_content_from_line(
    content: &str,
    start_line: u64,
    source: &LineSource<'_>,
) -> ParsedContent {
    let mut parsed = ParsedContent::default();
    let mut line_number = 0u64;
    for segment in content.split_inclusive('\n') {
        line_number += 1;
        let terminated = segment.ends_with('\n');
        if line_number <= start_line {
            parsed.line_count = line_number;
            continue;
        }
        let line = segment.trim_end_matches(['\n', '\r']);
        match parse_line(line, source, line_number as usize) {
            Ok(Some(entry)) => {
                parsed.entries.push(entry);
                parsed.line_count = line_number;
            }
            Ok(None) if terminated => parsed.line_count = line_number,
            Ok(None) => {}
            Err(err) if terminated => {
                parsed.errors.push(err);
                parsed.line_count = line_number;
            }
            Err(_) => {}
        }
    }
    parsed
}
