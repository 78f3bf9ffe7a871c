use serde::Serialize;
use usage_core::{BillingBlock, DailyUsage, MonthlyUsage, ProjectUsage, SessionUsage};
use usage_db::{BlockFilter, DailyFilter, Db, MonthlyFilter, SessionFilter};

use crate::config::{BlockParams, DailyParams, MonthlyParams, SessionParams};
use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};
use crate::util::time::{parse_date, parse_month, parse_optional, rfc3339_to_ms};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionUsage>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn ordered<T: PartialOrd>(start: Option<&T>, end: Option<&T>, what: &str) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(AppError::InvalidInput(format!("{} start is after end", what)));
    }
    Ok(())
}

/// Read-only aggregation queries with consumer-facing filter validation.
#[derive(Clone)]
pub struct AnalyticsService {
    config: SharedConfig,
}

impl AnalyticsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn daily(&self, params: &DailyParams) -> Result<Vec<DailyUsage>> {
        let filter = DailyFilter {
            start_date: parse_optional(params.start_date.as_deref(), parse_date)?,
            end_date: parse_optional(params.end_date.as_deref(), parse_date)?,
            project: non_empty(params.project.as_ref()),
        };
        ordered(filter.start_date.as_ref(), filter.end_date.as_ref(), "date")?;
        Ok(self.db()?.daily_usage(&filter)?)
    }

    pub fn monthly(&self, params: &MonthlyParams) -> Result<Vec<MonthlyUsage>> {
        let filter = MonthlyFilter {
            start_month: parse_optional(params.start_month.as_deref(), parse_month)?,
            end_month: parse_optional(params.end_month.as_deref(), parse_month)?,
            project: non_empty(params.project.as_ref()),
        };
        ordered(filter.start_month.as_ref(), filter.end_month.as_ref(), "month")?;
        Ok(self.db()?.monthly_usage(&filter)?)
    }

    pub fn sessions(&self, params: &SessionParams) -> Result<SessionPage> {
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Err(AppError::InvalidInput("limit must be positive".to_string()));
        }
        let filter = SessionFilter {
            project: non_empty(params.project.as_ref()),
            limit: limit.min(MAX_PAGE_LIMIT),
            offset: params.offset.unwrap_or(0),
        };
        let db = self.db()?;
        let sessions = db.session_usage(&filter)?;
        let total = db.count_sessions(&filter)?;
        Ok(SessionPage {
            sessions,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub fn blocks(&self, params: &BlockParams) -> Result<Vec<BillingBlock>> {
        let filter = BlockFilter {
            start_time: parse_optional(params.start_time.as_deref(), rfc3339_to_ms)?,
            end_time: parse_optional(params.end_time.as_deref(), rfc3339_to_ms)?,
            project: non_empty(params.project.as_ref()),
        };
        ordered(filter.start_time.as_ref(), filter.end_time.as_ref(), "time")?;
        Ok(self.db()?.billing_blocks(&filter)?)
    }

    pub fn projects(&self) -> Result<Vec<ProjectUsage>> {
        Ok(self.db()?.project_usage()?)
    }

    pub fn total_cost(&self) -> Result<f64> {
        Ok(self.db()?.total_cost()?)
    }

    pub fn total_tokens(&self) -> Result<u64> {
        Ok(self.db()?.total_tokens()?)
    }
}
