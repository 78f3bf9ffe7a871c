#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use usage_app::{AppConfig, AppState};

pub struct TestEnv {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl TestEnv {
    pub fn config_dir(&self) -> PathBuf {
        self.dir.path().join("claude")
    }

    pub fn log_path(&self, project: &str, name: &str) -> PathBuf {
        let dir = self.config_dir().join("projects").join(project);
        fs::create_dir_all(&dir).expect("create project dir");
        dir.join(name)
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.config.clone())
    }

    /// Makes every `log_entry` insert fail until `allow_entry_inserts`.
    pub fn reject_entry_inserts(&self) {
        self.db_conn()
            .execute_batch(
                "CREATE TRIGGER reject_log_entry BEFORE INSERT ON log_entry
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
            )
            .expect("create trigger");
    }

    pub fn allow_entry_inserts(&self) {
        self.db_conn()
            .execute_batch("DROP TRIGGER reject_log_entry")
            .expect("drop trigger");
    }

    fn db_conn(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.config.db_path).expect("open conn")
    }
}

/// Polls the database until it holds `expected` entries or about ten seconds pass.
pub async fn wait_for_entries(state: &AppState, expected: u64) -> bool {
    for _ in 0..200 {
        let count = state
            .open_db()
            .expect("db")
            .count_entries()
            .expect("count");
        if count == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Scratch config dir and database with timers and watching off.
pub fn setup_env() -> TestEnv {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_dir = dir.path().join("claude");
    fs::create_dir_all(config_dir.join("projects")).expect("projects dir");
    let mut config = AppConfig::with_db_path(dir.path().join("data/usage.sqlite"));
    config.config_dirs = vec![config_dir];
    config.scan_interval_ms = 0;
    config.watch_enabled = false;
    TestEnv { dir, config }
}

pub fn record(uuid: &str, session: &str, timestamp: &str, cost: f64) -> String {
    format!(
        r#"{{"uuid":"{uuid}","sessionId":"{session}","timestamp":"{timestamp}","message":{{"role":"assistant","model":"claude-sonnet-4","usage":{{"input_tokens":100,"output_tokens":50,"cache_creation_input_tokens":10,"cache_read_input_tokens":5}}}},"costUSD":{cost},"gitBranch":"main","cwd":"/work"}}"#
    )
}

pub fn write_lines(path: &Path, lines: &[String]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).expect("write log");
}

pub fn append_lines(path: &Path, lines: &[String]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log");
    for line in lines {
        writeln!(file, "{}", line).expect("append log");
    }
}
