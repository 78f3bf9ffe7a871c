use rusqlite::Connection;
use usage_db::{Db, MIGRATIONS};

#[test]
fn migrate_adopts_tables_created_without_bookkeeping() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("adopt.sqlite");
    {
        let conn = Connection::open(&db_path).expect("open conn");
        let migration = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(migration).expect("migrate 0001");
        conn.execute(
            r#"
            INSERT INTO processed_file (
              file_path, last_modified_at, last_size, last_line_count, processed_at
            ) VALUES ('/logs/projects/app1/s1.jsonl', 1, 10, 2, 3)
            "#,
            [],
        )
        .expect("insert processed file");
    }

    let mut db = Db::open(&db_path).expect("open db");
    db.migrate().expect("migrate");
    let applied = db.applied_migrations().expect("applied");
    assert_eq!(applied.len(), MIGRATIONS.len());

    let file = db
        .get_processed_file("/logs/projects/app1/s1.jsonl")
        .expect("lookup")
        .expect("kept row");
    assert_eq!(file.last_line_count, 2);
}

#[test]
fn migrate_creates_log_entry_indexes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("indexes.sqlite");
    let mut db = Db::open(&db_path).expect("open db");
    db.migrate().expect("migrate");
    drop(db);

    let conn = Connection::open(&db_path).expect("open conn");
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'log_entry' AND name LIKE 'idx_%'")
        .expect("prepare");
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows");
    for expected in [
        "idx_log_entry_timestamp",
        "idx_log_entry_session",
        "idx_log_entry_project",
        "idx_log_entry_file",
    ] {
        assert!(names.iter().any(|name| name == expected), "missing {expected}");
    }
}
