use std::collections::{BTreeMap, HashSet};

use rusqlite::params;
use usage_core::{
    BILLING_BLOCK_MS, BillingBlock, DailyUsage, MonthlyUsage, ProjectUsage, SessionUsage,
    TokenCounts, billing_block_index, ms_to_rfc3339,
};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{
    date_range_ms, local_date, local_month, month_range_ms, row_to_usage_row, within,
};
use crate::types::{BlockFilter, DailyFilter, MonthlyFilter, SessionFilter, UsageRow};

#[derive(Default)]
struct Accumulator {
    tokens: TokenCounts,
    cost_usd: f64,
    requests: u64,
    sessions: HashSet<String>,
    days: HashSet<String>,
}

impl Accumulator {
    fn push(&mut self, row: &UsageRow) {
        self.tokens = self.tokens.add(row.tokens);
        self.cost_usd += row.cost_usd;
        self.requests += 1;
        self.sessions.insert(row.session_id.clone());
    }
}

impl Db {
    pub(crate) fn load_usage_rows(
        &self,
        project: Option<&str>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<UsageRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, session_id, input_tokens, output_tokens,
                   cache_creation_input_tokens, cache_read_input_tokens, cost_usd
            FROM log_entry
            WHERE (?1 IS NULL OR project_path = ?1)
              AND (?2 IS NULL OR timestamp >= ?2)
              AND (?3 IS NULL OR timestamp < ?3)
            ORDER BY timestamp ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![project, start_ms, end_ms], row_to_usage_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Usage grouped by local calendar date, oldest first.
    pub fn daily_usage(&self, filter: &DailyFilter) -> Result<Vec<DailyUsage>> {
        let (start_ms, end_ms) =
            date_range_ms(filter.start_date.as_deref(), filter.end_date.as_deref());
        let rows = self.load_usage_rows(filter.project.as_deref(), start_ms, end_ms)?;
        let mut buckets: BTreeMap<String, Accumulator> = BTreeMap::new();
        for row in &rows {
            let date = local_date(row.timestamp);
            if !within(
                &date,
                filter.start_date.as_deref(),
                filter.end_date.as_deref(),
            ) {
                continue;
            }
            buckets.entry(date).or_default().push(row);
        }
        Ok(buckets
            .into_iter()
            .map(|(date, acc)| DailyUsage {
                date,
                input_tokens: acc.tokens.input_tokens,
                output_tokens: acc.tokens.output_tokens,
                cache_creation_input_tokens: acc.tokens.cache_creation_input_tokens,
                cache_read_input_tokens: acc.tokens.cache_read_input_tokens,
                total_tokens: acc.tokens.total(),
                cost_usd: acc.cost_usd,
                request_count: acc.requests,
                session_count: acc.sessions.len() as u64,
            })
            .collect())
    }

    /// Usage grouped by local calendar month, oldest first.
    pub fn monthly_usage(&self, filter: &MonthlyFilter) -> Result<Vec<MonthlyUsage>> {
        let (start_ms, end_ms) =
            month_range_ms(filter.start_month.as_deref(), filter.end_month.as_deref());
        let rows = self.load_usage_rows(filter.project.as_deref(), start_ms, end_ms)?;
        let mut buckets: BTreeMap<String, Accumulator> = BTreeMap::new();
        for row in &rows {
            let month = local_month(row.timestamp);
            if !within(
                &month,
                filter.start_month.as_deref(),
                filter.end_month.as_deref(),
            ) {
                continue;
            }
            let acc = buckets.entry(month).or_default();
            acc.push(row);
            acc.days.insert(local_date(row.timestamp));
        }
        Ok(buckets
            .into_iter()
            .map(|(month, acc)| MonthlyUsage {
                month,
                input_tokens: acc.tokens.input_tokens,
                output_tokens: acc.tokens.output_tokens,
                cache_creation_input_tokens: acc.tokens.cache_creation_input_tokens,
                cache_read_input_tokens: acc.tokens.cache_read_input_tokens,
                total_tokens: acc.tokens.total(),
                cost_usd: acc.cost_usd,
                request_count: acc.requests,
                session_count: acc.sessions.len() as u64,
                active_days: acc.days.len() as u64,
            })
            .collect())
    }

    /// Sessions ordered by most recent activity.
    pub fn session_usage(&self, filter: &SessionFilter) -> Result<Vec<SessionUsage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT e.session_id,
                   MIN(e.timestamp) AS start_ts,
                   MAX(e.timestamp) AS end_ts,
                   SUM(e.input_tokens),
                   SUM(e.output_tokens),
                   SUM(e.cache_creation_input_tokens),
                   SUM(e.cache_read_input_tokens),
                   SUM(e.total_tokens),
                   SUM(e.cost_usd),
                   COUNT(*),
                   (SELECT l.project_path FROM log_entry l
                     WHERE l.session_id = e.session_id
                     ORDER BY l.timestamp DESC LIMIT 1),
                   (SELECT l.model FROM log_entry l
                     WHERE l.session_id = e.session_id AND l.model IS NOT NULL
                     ORDER BY l.timestamp DESC LIMIT 1),
                   (SELECT l.git_branch FROM log_entry l
                     WHERE l.session_id = e.session_id AND l.git_branch IS NOT NULL
                     ORDER BY l.timestamp DESC LIMIT 1)
            FROM log_entry e
            WHERE (?1 IS NULL OR e.project_path = ?1)
            GROUP BY e.session_id
            ORDER BY end_ts DESC, e.session_id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![filter.project, filter.limit, filter.offset],
            |row| {
                let start_ts: i64 = row.get(1)?;
                let end_ts: i64 = row.get(2)?;
                Ok(SessionUsage {
                    session_id: row.get(0)?,
                    start_time: ms_to_rfc3339(start_ts),
                    end_time: ms_to_rfc3339(end_ts),
                    input_tokens: row.get::<_, i64>(3)?.max(0) as u64,
                    output_tokens: row.get::<_, i64>(4)?.max(0) as u64,
                    cache_creation_input_tokens: row.get::<_, i64>(5)?.max(0) as u64,
                    cache_read_input_tokens: row.get::<_, i64>(6)?.max(0) as u64,
                    total_tokens: row.get::<_, i64>(7)?.max(0) as u64,
                    cost_usd: row.get(8)?,
                    request_count: row.get::<_, i64>(9)?.max(0) as u64,
                    project_path: row.get(10)?,
                    last_model: row.get(11)?,
                    git_branch: row.get(12)?,
                })
            },
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn count_sessions(&self, filter: &SessionFilter) -> Result<u64> {
        self.conn
            .query_row(
                r#"
                SELECT COUNT(DISTINCT session_id)
                FROM log_entry
                WHERE (?1 IS NULL OR project_path = ?1)
                "#,
                params![filter.project],
                |row| row.get::<_, i64>(0),
            )
            .map(|value| value.max(0) as u64)
            .map_err(DbError::from)
    }

    /// Fixed five-hour blocks anchored at the epoch, newest first.
    pub fn billing_blocks(&self, filter: &BlockFilter) -> Result<Vec<BillingBlock>> {
        let rows = self.load_usage_rows(
            filter.project.as_deref(),
            filter.start_time,
            filter.end_time,
        )?;
        let mut buckets: BTreeMap<i64, Accumulator> = BTreeMap::new();
        for row in &rows {
            buckets
                .entry(billing_block_index(row.timestamp))
                .or_default()
                .push(row);
        }
        Ok(buckets
            .into_iter()
            .rev()
            .map(|(index, acc)| {
                let start_ms = index * BILLING_BLOCK_MS;
                let end_ms = start_ms.saturating_add(BILLING_BLOCK_MS);
                BillingBlock {
                    block_start: ms_to_rfc3339(start_ms),
                    block_end: ms_to_rfc3339(end_ms),
                    start_ms,
                    end_ms,
                    input_tokens: acc.tokens.input_tokens,
                    output_tokens: acc.tokens.output_tokens,
                    cache_creation_input_tokens: acc.tokens.cache_creation_input_tokens,
                    cache_read_input_tokens: acc.tokens.cache_read_input_tokens,
                    total_tokens: acc.tokens.total(),
                    cost_usd: acc.cost_usd,
                    request_count: acc.requests,
                    session_count: acc.sessions.len() as u64,
                }
            })
            .collect())
    }

    /// Projects ordered by most recent activity.
    pub fn project_usage(&self) -> Result<Vec<ProjectUsage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT project_path,
                   COUNT(DISTINCT session_id),
                   SUM(total_tokens),
                   SUM(cost_usd),
                   MAX(timestamp) AS last_ts
            FROM log_entry
            GROUP BY project_path
            ORDER BY last_ts DESC, project_path ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ProjectUsage {
                project_path: row.get(0)?,
                session_count: row.get::<_, i64>(1)?.max(0) as u64,
                total_tokens: row.get::<_, i64>(2)?.max(0) as u64,
                cost_usd: row.get(3)?,
                last_activity: ms_to_rfc3339(row.get(4)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn total_cost(&self) -> Result<f64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(cost_usd), 0.0) FROM log_entry",
                [],
                |row| row.get::<_, f64>(0),
            )
            .map_err(DbError::from)
    }

    pub fn total_tokens(&self) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(total_tokens), 0) FROM log_entry",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|value| value.max(0) as u64)
            .map_err(DbError::from)
    }
}
