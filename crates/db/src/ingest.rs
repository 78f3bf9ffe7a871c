use std::collections::HashMap;

use rusqlite::params;
use tracing::debug;
use usage_core::{LogEntry, ProcessedFile};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::row_to_processed_file;

fn sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Db {
    /// Upserts every entry in one transaction, keyed by `uuid`.
    pub fn save_entries(&mut self, entries: &[LogEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut saved = 0usize;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO log_entry (
                  uuid, session_id, project_path, timestamp, role, model,
                  input_tokens, output_tokens, cache_creation_input_tokens,
                  cache_read_input_tokens, total_tokens, cost_usd, git_branch, cwd,
                  file_path, file_modified_at
                ) VALUES (
                  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
                )
                ON CONFLICT(uuid) DO UPDATE SET
                  session_id = excluded.session_id,
                  project_path = excluded.project_path,
                  timestamp = excluded.timestamp,
                  role = excluded.role,
                  model = excluded.model,
                  input_tokens = excluded.input_tokens,
                  output_tokens = excluded.output_tokens,
                  cache_creation_input_tokens = excluded.cache_creation_input_tokens,
                  cache_read_input_tokens = excluded.cache_read_input_tokens,
                  total_tokens = excluded.total_tokens,
                  cost_usd = excluded.cost_usd,
                  git_branch = excluded.git_branch,
                  cwd = excluded.cwd,
                  file_path = excluded.file_path,
                  file_modified_at = excluded.file_modified_at
                "#,
            )?;
            for entry in entries {
                let rows = stmt.execute(params![
                    entry.uuid,
                    entry.session_id,
                    entry.project_path,
                    entry.timestamp,
                    entry.role,
                    entry.model,
                    sql_count(entry.tokens.input_tokens),
                    sql_count(entry.tokens.output_tokens),
                    sql_count(entry.tokens.cache_creation_input_tokens),
                    sql_count(entry.tokens.cache_read_input_tokens),
                    sql_count(entry.total_tokens()),
                    entry.cost_usd,
                    entry.git_branch,
                    entry.cwd,
                    entry.file_path,
                    entry.file_modified_at,
                ])?;
                if rows > 0 {
                    saved += 1;
                }
            }
        }
        tx.commit()?;
        Ok(saved)
    }

    pub fn get_processed_files(&self) -> Result<HashMap<String, ProcessedFile>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT file_path, last_modified_at, last_size, last_line_count, processed_at
            FROM processed_file
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_processed_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|file| (file.file_path.clone(), file))
            .collect())
    }

    pub fn get_processed_file(&self, file_path: &str) -> Result<Option<ProcessedFile>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT file_path, last_modified_at, last_size, last_line_count, processed_at
            FROM processed_file
            WHERE file_path = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![file_path])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_processed_file(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn mark_file_processed(&self, file: &ProcessedFile) -> Result<()> {
        self.conn.execute(UPSERT_PROCESSED_FILE, processed_file_params(file))?;
        Ok(())
    }

    /// Upserts a batch of watermarks atomically.
    pub fn mark_files_processed(&mut self, files: &[ProcessedFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_PROCESSED_FILE)?;
            for file in files {
                stmt.execute(processed_file_params(file))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Removes a file's entries and its watermark. Returns the entries removed.
    pub fn delete_entries_from_file(&mut self, file_path: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM log_entry WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM processed_file WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.commit()?;
        debug!(file = file_path, removed, "deleted entries for file");
        Ok(removed)
    }

    pub fn count_entries(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM log_entry", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|value| value.max(0) as u64)
            .map_err(DbError::from)
    }

    pub fn count_entries_for_file(&self, file_path: &str) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM log_entry WHERE file_path = ?1",
                params![file_path],
                |row| row.get::<_, i64>(0),
            )
            .map(|value| value.max(0) as u64)
            .map_err(DbError::from)
    }

    pub fn get_entry(&self, uuid: &str) -> Result<Option<LogEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT uuid, session_id, project_path, timestamp, role, model,
                   input_tokens, output_tokens, cache_creation_input_tokens,
                   cache_read_input_tokens, cost_usd, git_branch, cwd,
                   file_path, file_modified_at
            FROM log_entry
            WHERE uuid = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![uuid])?;
        if let Some(row) = rows.next()? {
            Ok(Some(crate::helpers::row_to_log_entry(row)?))
        } else {
            Ok(None)
        }
    }
}

const UPSERT_PROCESSED_FILE: &str = r#"
    INSERT INTO processed_file (
      file_path, last_modified_at, last_size, last_line_count, processed_at
    ) VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(file_path) DO UPDATE SET
      last_modified_at = excluded.last_modified_at,
      last_size = excluded.last_size,
      last_line_count = excluded.last_line_count,
      processed_at = excluded.processed_at
"#;

fn processed_file_params(file: &ProcessedFile) -> (&str, i64, i64, i64, i64) {
    (
        file.file_path.as_str(),
        file.last_modified_at,
        file.last_size as i64,
        file.last_line_count as i64,
        file.processed_at,
    )
}
