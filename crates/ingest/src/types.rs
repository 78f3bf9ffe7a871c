
use serde::Serialize;
use usage_core::{LogEntry, ProcessedFile};

/// A line or file that could not be turned into entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub file_path: String,
    /// 1-based; `None` when the whole file failed.
    pub line_number: Option<usize>,
    pub message: String,
}

impl ScanError {
    pub fn line(file_path: &str, line_number: usize, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.to_string(),
            line_number: Some(line_number),
            message: message.into(),
        }
    }

    pub fn file(file_path: &str, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.to_string(),
            line_number: None,
            message: message.into(),
        }
    }
}

/// Output of parsing a text blob from some line onward.
#[derive(Debug, Default)]
pub struct ParsedContent {
    pub entries: Vec<LogEntry>,
    pub errors: Vec<ScanError>,
    /// Lines accounted for from the start of the blob, including skipped ones.
    pub line_count: u64,
}

/// One file read during a scan.
#[derive(Debug, Clone)]
pub struct FileScan {
    pub file_path: String,
    pub project_path: String,
    pub modified_at: i64,
    pub size: u64,
    pub start_line: u64,
    pub line_count: u64,
    pub entries: Vec<LogEntry>,
    pub errors: Vec<ScanError>,
}

impl FileScan {
    pub fn watermark(&self, processed_at: i64) -> ProcessedFile {
        ProcessedFile {
            file_path: self.file_path.clone(),
            last_modified_at: self.modified_at,
            last_size: self.size,
            last_line_count: self.line_count,
            processed_at,
        }
    }
}

/// Transient aggregate of one scan operation.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileScan>,
    pub files_processed: usize,
    pub files_skipped: usize,
    /// File-level failures; line-level ones live on each `FileScan`.
    pub errors: Vec<ScanError>,
}

impl ScanResult {
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.files.iter().flat_map(|file| file.entries.iter())
    }

    pub fn entries_found(&self) -> usize {
        self.files.iter().map(|file| file.entries.len()).sum()
    }

    pub fn all_errors(&self) -> Vec<ScanError> {
        let mut errors = self.errors.clone();
        for file in &self.files {
            errors.extend(file.errors.iter().cloned());
        }
        errors
    }
}

/// Counts reported after a scan has been persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub entries_found: usize,
    pub entries_saved: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub errors: Vec<ScanError>,
}

/// Errors emitted by the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
