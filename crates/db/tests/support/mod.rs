#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use usage_core::{LogEntry, ProcessedFile, TokenCounts};
use usage_db::Db;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn tokens(input: u64, output: u64, cache_creation: u64, cache_read: u64) -> TokenCounts {
    TokenCounts {
        input_tokens: input,
        output_tokens: output,
        cache_creation_input_tokens: cache_creation,
        cache_read_input_tokens: cache_read,
    }
}

pub fn make_entry(uuid: &str, session_id: &str, project: &str, timestamp: i64) -> LogEntry {
    LogEntry {
        uuid: uuid.to_string(),
        session_id: session_id.to_string(),
        project_path: project.to_string(),
        timestamp,
        role: "assistant".to_string(),
        model: Some("claude-sonnet-4".to_string()),
        tokens: tokens(100, 50, 10, 5),
        cost_usd: 0.01,
        git_branch: Some("main".to_string()),
        cwd: None,
        file_path: format!("/logs/projects/{}/{}.jsonl", project, session_id),
        file_modified_at: timestamp,
    }
}

pub fn make_processed(file_path: &str, line_count: u64) -> ProcessedFile {
    ProcessedFile {
        file_path: file_path.to_string(),
        last_modified_at: 1_700_000_000_000,
        last_size: 1024,
        last_line_count: line_count,
        processed_at: 1_700_000_000_500,
    }
}

/// Noon UTC on the given day, so local-date grouping is stable across timezones.
pub fn noon_utc(year: i32, month: u32, day: u32) -> i64 {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid date")
        .and_utc()
        .timestamp_millis()
}
