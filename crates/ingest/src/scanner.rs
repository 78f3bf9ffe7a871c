use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use rayon::prelude::*;
use tracing::{debug, warn};
use usage_core::ProcessedFile;
use walkdir::WalkDir;

use crate::parser::{LineSource, parse_content, parse_content_from_line};
use crate::types::{FileScan, ScanError, ScanResult};

pub const PROJECTS_DIR: &str = "projects";
pub const LOG_EXTENSION: &str = "jsonl";

/// Project recorded for files sitting directly under `projects/`.
pub const UNKNOWN_PROJECT: &str = "unknown";

pub fn is_log_path(path: &Path) -> bool {
    path.extension().and_then(|value| value.to_str()) == Some(LOG_EXTENSION)
}

/// A log file found under some `<config dir>/projects/` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub file_path: String,
    pub project_path: String,
}

impl DiscoveredFile {
    fn new(projects_dir: &Path, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file_path: path.to_string_lossy().to_string(),
            project_path: project_path_for(projects_dir, path),
        }
    }
}

/// First directory below `projects_dir` on the way to `path`.
pub fn project_path_for(projects_dir: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(projects_dir) else {
        return UNKNOWN_PROJECT.to_string();
    };
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(project)), Some(_)) => project.to_string_lossy().to_string(),
        _ => UNKNOWN_PROJECT.to_string(),
    }
}

pub fn discover_files(config_dirs: &[PathBuf], errors: &mut Vec<ScanError>) -> Vec<DiscoveredFile> {
    let mut files = Vec::new();
    for config_dir in config_dirs {
        let projects_dir = config_dir.join(PROJECTS_DIR);
        if !projects_dir.is_dir() {
            warn!(dir = %projects_dir.display(), "projects directory missing; skipping");
            continue;
        }
        for entry in WalkDir::new(&projects_dir)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let file_path = err
                        .path()
                        .map(|path| path.to_string_lossy().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    errors.push(ScanError::file(&file_path, err.to_string()));
                    continue;
                }
            };
            if entry.file_type().is_file() && is_log_path(entry.path()) {
                files.push(DiscoveredFile::new(&projects_dir, entry.path()));
            }
        }
    }
    files
}

/// Matches an arbitrary path against the scanned trees.
pub fn locate_file(config_dirs: &[PathBuf], path: &Path) -> Option<DiscoveredFile> {
    if !is_log_path(path) {
        return None;
    }
    config_dirs
        .iter()
        .map(|config_dir| config_dir.join(PROJECTS_DIR))
        .find(|projects_dir| path.starts_with(projects_dir))
        .map(|projects_dir| DiscoveredFile::new(&projects_dir, path))
}

fn file_stat(path: &Path) -> io::Result<(i64, u64)> {
    let metadata = fs::metadata(path)?;
    let modified_at = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    Ok((modified_at, metadata.len()))
}

enum FileOutcome {
    Unchanged,
    Scanned(FileScan),
    Failed(ScanError),
}

fn scan_file(file: &DiscoveredFile, prior: Option<&ProcessedFile>, force: bool) -> FileOutcome {
    let (modified_at, size) = match file_stat(&file.path) {
        Ok(stat) => stat,
        Err(err) => return FileOutcome::Failed(ScanError::file(&file.file_path, err.to_string())),
    };
    if !force && prior.is_some_and(|prior| prior.is_unchanged(modified_at, size)) {
        return FileOutcome::Unchanged;
    }
    let mut start_line = match prior {
        Some(prior) if size >= prior.last_size => prior.last_line_count,
        Some(prior) => {
            debug!(
                file = %file.file_path,
                previous = prior.last_size,
                size,
                "file shrank; reading from the start"
            );
            0
        }
        None => 0,
    };
    let bytes = match fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(err) => return FileOutcome::Failed(ScanError::file(&file.file_path, err.to_string())),
    };
    let content = String::from_utf8_lossy(&bytes);
    let source = LineSource {
        file_path: &file.file_path,
        project_path: &file.project_path,
        file_modified_at: modified_at,
    };
    let mut parsed = parse_content_from_line(&content, start_line, &source);
    if parsed.line_count < start_line {
        debug!(
            file = %file.file_path,
            watermark = start_line,
            lines = parsed.line_count,
            "file has fewer lines than its watermark; reading from the start"
        );
        start_line = 0;
        parsed = parse_content(&content, &source);
    }
    FileOutcome::Scanned(FileScan {
        file_path: file.file_path.clone(),
        project_path: file.project_path.clone(),
        modified_at,
        size,
        start_line,
        line_count: parsed.line_count,
        entries: parsed.entries,
        errors: parsed.errors,
    })
}

fn scan_discovered(
    files: Vec<DiscoveredFile>,
    processed: &HashMap<String, ProcessedFile>,
    force: bool,
    mut result: ScanResult,
) -> ScanResult {
    let outcomes = files
        .par_iter()
        .map(|file| scan_file(file, processed.get(&file.file_path), force))
        .collect::<Vec<_>>();
    for outcome in outcomes {
        match outcome {
            FileOutcome::Unchanged => result.files_skipped += 1,
            FileOutcome::Scanned(scan) => {
                result.files_processed += 1;
                result.files.push(scan);
            }
            FileOutcome::Failed(err) => {
                warn!(file = %err.file_path, error = %err.message, "failed to read log file");
                result.files_skipped += 1;
                result.errors.push(err);
            }
        }
    }
    result
}

/// Reads every log file from line 0.
pub fn full_scan(config_dirs: &[PathBuf]) -> ScanResult {
    incremental_scan(config_dirs, &HashMap::new())
}

/// Reads only files whose `(mtime, size)` moved since their watermark, from
/// the watermark onward.
pub fn incremental_scan(
    config_dirs: &[PathBuf],
    processed: &HashMap<String, ProcessedFile>,
) -> ScanResult {
    let mut result = ScanResult::default();
    let files = discover_files(config_dirs, &mut result.errors);
    scan_discovered(files, processed, false, result)
}

/// Reads one file from its watermark even if its metadata looks unchanged.
pub fn scan_changed_file(
    file: DiscoveredFile,
    processed: &HashMap<String, ProcessedFile>,
) -> ScanResult {
    scan_discovered(vec![file], processed, true, ScanResult::default())
}
