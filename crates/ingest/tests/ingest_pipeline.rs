use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ingest::{
    full_scan, incremental_scan, ingest_config_dirs, locate_file, persist_scan, scan_changed_file,
};
use tempfile::{TempDir, tempdir};
use usage_db::Db;

const REJECT_INSERTS: &str = r#"
    CREATE TRIGGER reject_log_entry BEFORE INSERT ON log_entry
    BEGIN SELECT RAISE(ABORT, 'rejected'); END
"#;

struct Fixture {
    dir: TempDir,
    db: Db,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("temp dir");
        let mut db = Db::open(dir.path().join("usage.sqlite")).expect("open db");
        db.migrate().expect("migrate db");
        Self { dir, db }
    }

    fn config_dir(&self) -> PathBuf {
        self.dir.path().join("claude")
    }

    fn config_dirs(&self) -> Vec<PathBuf> {
        vec![self.config_dir()]
    }

    fn reject_entry_inserts(&self) {
        let conn = rusqlite::Connection::open(self.dir.path().join("usage.sqlite"))
            .expect("open conn");
        conn.execute_batch(REJECT_INSERTS).expect("create trigger");
    }

    fn log_path(&self, project: &str, name: &str) -> PathBuf {
        let dir = self.config_dir().join("projects").join(project);
        fs::create_dir_all(&dir).expect("create project dir");
        dir.join(name)
    }
}

fn record(uuid: &str, cost: f64) -> String {
    format!(
        r#"{{"uuid":"{uuid}","sessionId":"s1","timestamp":"2025-03-01T12:00:00Z","message":{{"role":"assistant","model":"claude-sonnet-4","usage":{{"input_tokens":100,"output_tokens":50}}}},"costUSD":{cost}}}"#
    )
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log");
    file.write_all(text.as_bytes()).expect("append log");
}

#[test]
fn ingests_project_logs_end_to_end() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    fs::write(&log, format!("{}\n{}\n", record("a", 0.01), record("b", 0.02))).expect("write log");

    let dirs = fx.config_dirs();
    let stats = ingest_config_dirs(&mut fx.db, &dirs).expect("ingest");
    assert_eq!(stats.entries_found, 2);
    assert_eq!(stats.entries_saved, 2);
    assert_eq!(stats.files_processed, 1);
    assert!(stats.errors.is_empty());

    assert!((fx.db.total_cost().expect("cost") - 0.03).abs() < 1e-9);
    let projects = fx.db.project_usage().expect("projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].project_path, "app1");

    let watermark = fx
        .db
        .get_processed_file(&log.to_string_lossy())
        .expect("lookup")
        .expect("watermark");
    assert_eq!(watermark.last_line_count, 2);
}

#[test]
fn unchanged_files_are_skipped_on_rescan() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    fs::write(&log, format!("{}\n", record("a", 0.01))).expect("write log");
    let first = full_scan(&fx.config_dirs());
    persist_scan(&mut fx.db, &first).expect("persist");

    let processed = fx.db.get_processed_files().expect("processed");
    let second = incremental_scan(&fx.config_dirs(), &processed);
    assert_eq!(second.entries_found(), 0);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 1);
    assert_eq!(fx.db.count_entries().expect("count"), 1);
}

#[test]
fn appended_lines_are_read_from_the_watermark() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    fs::write(&log, format!("{}\n{}\n", record("a", 0.01), record("b", 0.01))).expect("write log");
    let first = full_scan(&fx.config_dirs());
    persist_scan(&mut fx.db, &first).expect("persist");

    append(&log, &format!("{}\n{}\n{}\n", record("c", 0.01), record("d", 0.01), record("e", 0.01)));
    let processed = fx.db.get_processed_files().expect("processed");
    let scan = incremental_scan(&fx.config_dirs(), &processed);
    assert_eq!(scan.entries_found(), 3);
    assert_eq!(scan.files[0].start_line, 2);
    persist_scan(&mut fx.db, &scan).expect("persist");

    assert_eq!(fx.db.count_entries().expect("count"), 5);
    let watermark = fx
        .db
        .get_processed_file(&log.to_string_lossy())
        .expect("lookup")
        .expect("watermark");
    assert_eq!(watermark.last_line_count, 5);
}

#[test]
fn malformed_lines_are_isolated() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    fs::write(
        &log,
        format!("{}\n{{\"uuid\": broken\n{}\n", record("a", 0.01), record("b", 0.01)),
    )
    .expect("write log");

    let dirs = fx.config_dirs();
    let stats = ingest_config_dirs(&mut fx.db, &dirs).expect("ingest");
    assert_eq!(stats.entries_saved, 2);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].line_number, Some(2));
    assert_eq!(stats.errors[0].file_path, log.to_string_lossy());
}

#[test]
fn partial_trailing_line_is_picked_up_once_complete() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    let pending = record("b", 0.01);
    let (head, tail) = pending.split_at(pending.len() / 2);
    fs::write(&log, format!("{}\n{}", record("a", 0.01), head)).expect("write log");

    let first = full_scan(&fx.config_dirs());
    assert_eq!(first.entries_found(), 1);
    assert!(first.all_errors().is_empty());
    persist_scan(&mut fx.db, &first).expect("persist");

    append(&log, &format!("{}\n", tail));
    let processed = fx.db.get_processed_files().expect("processed");
    let second = incremental_scan(&fx.config_dirs(), &processed);
    assert_eq!(second.entries_found(), 1);
    assert_eq!(second.files[0].entries[0].uuid, "b");
}

#[test]
fn truncated_file_is_read_from_the_start() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    fs::write(
        &log,
        format!("{}\n{}\n{}\n", record("a", 0.01), record("b", 0.01), record("c", 0.01)),
    )
    .expect("write log");
    let first = full_scan(&fx.config_dirs());
    persist_scan(&mut fx.db, &first).expect("persist");

    fs::write(&log, format!("{}\n", record("z", 0.05))).expect("rewrite log");
    let processed = fx.db.get_processed_files().expect("processed");
    let scan = incremental_scan(&fx.config_dirs(), &processed);
    assert_eq!(scan.files[0].start_line, 0);
    assert_eq!(scan.entries_found(), 1);
    persist_scan(&mut fx.db, &scan).expect("persist");

    assert!(fx.db.get_entry("z").expect("lookup").is_some());
    let watermark = fx
        .db
        .get_processed_file(&log.to_string_lossy())
        .expect("lookup")
        .expect("watermark");
    assert_eq!(watermark.last_line_count, 1);
}

#[test]
fn forced_file_scan_reads_only_past_the_watermark() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app2", "s9.jsonl");
    fs::write(&log, format!("{}\n", record("a", 0.01))).expect("write log");
    let first = full_scan(&fx.config_dirs());
    persist_scan(&mut fx.db, &first).expect("persist");

    let file = locate_file(&fx.config_dirs(), &log).expect("inside projects tree");
    assert_eq!(file.project_path, "app2");
    let processed = fx.db.get_processed_files().expect("processed");
    let scan = scan_changed_file(file, &processed);
    assert_eq!(scan.files_processed, 1);
    assert_eq!(scan.entries_found(), 0);
}

#[test]
fn missing_projects_directory_yields_empty_scan() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.config_dir()).expect("config dir");
    let scan = full_scan(&fx.config_dirs());
    assert_eq!(scan.entries_found(), 0);
    assert_eq!(scan.files_processed, 0);
    assert!(scan.all_errors().is_empty());
}

#[test]
fn non_log_files_are_ignored() {
    let fx = Fixture::new();
    fs::write(fx.log_path("app1", "notes.txt"), record("a", 0.01)).expect("write txt");
    fs::write(fx.log_path("app1", "s1.json"), record("b", 0.01)).expect("write json");
    let scan = full_scan(&fx.config_dirs());
    assert_eq!(scan.files_processed, 0);
}

#[test]
fn scans_every_config_dir() {
    let mut fx = Fixture::new();
    let second = fx.dir.path().join("other");
    fs::write(fx.log_path("app1", "s1.jsonl"), format!("{}\n", record("a", 0.01))).expect("write");
    let other_project = second.join("projects").join("app3");
    fs::create_dir_all(&other_project).expect("other project");
    fs::write(other_project.join("s2.jsonl"), format!("{}\n", record("b", 0.01))).expect("write");

    let dirs = [fx.config_dir(), second];
    let stats = ingest_config_dirs(&mut fx.db, &dirs).expect("ingest");
    assert_eq!(stats.files_processed, 2);
    let mut projects: Vec<String> = fx
        .db
        .project_usage()
        .expect("projects")
        .into_iter()
        .map(|project| project.project_path)
        .collect();
    projects.sort();
    assert_eq!(projects, vec!["app1".to_string(), "app3".to_string()]);
}

#[test]
fn failed_save_leaves_watermarks_untouched() {
    let mut fx = Fixture::new();
    let log = fx.log_path("app1", "s1.jsonl");
    let fresh = fx.log_path("app2", "s2.jsonl");
    fs::write(&log, format!("{}\n", record("a", 0.01))).expect("write log");
    let first = full_scan(&fx.config_dirs());
    persist_scan(&mut fx.db, &first).expect("persist");

    append(&log, &format!("{}\n", record("b", 0.01)));
    fs::write(&fresh, format!("{}\n", record("c", 0.01))).expect("write fresh log");
    fx.reject_entry_inserts();
    let before = fx.db.get_processed_files().expect("processed");
    let scan = incremental_scan(&fx.config_dirs(), &before);
    assert_eq!(scan.entries_found(), 2);
    assert!(persist_scan(&mut fx.db, &scan).is_err());

    let after = fx.db.get_processed_files().expect("processed");
    assert_eq!(after, before);
    assert_eq!(after[&*log.to_string_lossy()].last_line_count, 1);
    assert!(!after.contains_key(&*fresh.to_string_lossy()));
    assert_eq!(fx.db.count_entries().expect("count"), 1);
}
