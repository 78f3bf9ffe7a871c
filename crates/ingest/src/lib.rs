mod parser;
mod paths;
mod pipeline;
mod scanner;
mod types;

pub use parser::{LineSource, parse_content, parse_content_from_line, parse_line};
pub use paths::{
    CONFIG_DIR_ENV, default_config_dirs, override_from_env, resolve_config_dirs, split_override,
};
pub use pipeline::{PersistOutcome, ingest_config_dirs, persist_scan};
pub use scanner::{
    DiscoveredFile, LOG_EXTENSION, PROJECTS_DIR, UNKNOWN_PROJECT, discover_files, full_scan,
    incremental_scan, is_log_path, locate_file, project_path_for, scan_changed_file,
};
pub use types::{
    FileScan, IngestError, IngestStats, ParsedContent, Result, ScanError, ScanResult,
};
