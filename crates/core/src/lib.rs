use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Width of a billing block: five hours in milliseconds.
pub const BILLING_BLOCK_MS: i64 = 5 * 60 * 60 * 1000;

/// Role recorded when a source line carries none.
pub const UNKNOWN_ROLE: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl TokenCounts {
    /// Sum of the four counters. Never stored independently of them.
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }

    pub fn add(self, other: TokenCounts) -> TokenCounts {
        TokenCounts {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            cache_creation_input_tokens: self
                .cache_creation_input_tokens
                .saturating_add(other.cache_creation_input_tokens),
            cache_read_input_tokens: self
                .cache_read_input_tokens
                .saturating_add(other.cache_read_input_tokens),
        }
    }
}

/// One normalized usage record, keyed by `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub uuid: String,
    pub session_id: String,
    pub project_path: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub role: String,
    pub model: Option<String>,
    pub tokens: TokenCounts,
    pub cost_usd: f64,
    pub git_branch: Option<String>,
    pub cwd: Option<String>,
    pub file_path: String,
    pub file_modified_at: i64,
}

impl LogEntry {
    pub fn total_tokens(&self) -> u64 {
        self.tokens.total()
    }
}

/// Watermark for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_path: String,
    pub last_modified_at: i64,
    pub last_size: u64,
    pub last_line_count: u64,
    pub processed_at: i64,
}

impl ProcessedFile {
    pub fn is_unchanged(&self, modified_at: i64, size: u64) -> bool {
        self.last_modified_at == modified_at && self.last_size == size
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
    pub session_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub month: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
    pub session_count: u64,
    pub active_days: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    pub session_id: String,
    pub project_path: String,
    pub start_time: String,
    pub end_time: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
    pub last_model: Option<String>,
    pub git_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingBlock {
    pub block_start: String,
    pub block_end: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
    pub session_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectUsage {
    pub project_path: String,
    pub session_count: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub last_activity: String,
}

pub fn billing_block_index(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(BILLING_BLOCK_MS)
}

/// Start of the epoch-aligned block containing `timestamp_ms`.
pub fn billing_block_start(timestamp_ms: i64) -> i64 {
    billing_block_index(timestamp_ms) * BILLING_BLOCK_MS
}

pub fn ms_to_rfc3339(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
