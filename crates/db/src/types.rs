/// Inclusive local-calendar date range, `YYYY-MM-DD`.
#[derive(Debug, Clone, Default)]
pub struct DailyFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub project: Option<String>,
}

/// Inclusive local-calendar month range, `YYYY-MM`.
#[derive(Debug, Clone, Default)]
pub struct MonthlyFilter {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionFilter {
    pub project: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            project: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Entry timestamp bounds in epoch milliseconds; start inclusive, end exclusive.
#[derive(Debug, Clone, Default)]
pub struct BlockFilter {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub project: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct UsageRow {
    pub timestamp: i64,
    pub session_id: String,
    pub tokens: usage_core::TokenCounts,
    pub cost_usd: f64,
}
