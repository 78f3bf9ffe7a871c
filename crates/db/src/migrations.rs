use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use usage_core::now_ms;

use crate::Db;
use crate::error::Result;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_log_entry_indexes.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", MIGRATION_0001),
    ("0002_log_entry_indexes", MIGRATION_0002),
];

impl Db {
    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migration (
              name TEXT PRIMARY KEY,
              applied_at INTEGER NOT NULL
            )
            "#,
        )?;
        for (name, sql) in MIGRATIONS {
            if migration_applied(&tx, name)? {
                continue;
            }
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_migration (name, applied_at) VALUES (?1, ?2)",
                params![name, now_ms()],
            )?;
            debug!(migration = name, "applied migration");
        }
        tx.commit()?;
        Ok(())
    }

    pub fn applied_migrations(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM schema_migration ORDER BY name ASC")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn migration_applied(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM schema_migration WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
