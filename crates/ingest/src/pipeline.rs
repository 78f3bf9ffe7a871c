use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};
use usage_core::{ProcessedFile, now_ms};
use usage_db::Db;

use crate::scanner::full_scan;
use crate::types::{IngestStats, Result, ScanResult};

/// What a scan left behind in the database.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub entries_saved: usize,
    pub watermarks: Vec<ProcessedFile>,
}

/// Saves entries first, then advances watermarks for every file read. A failed
/// save leaves all watermarks untouched so the lines are read again next time.
pub fn persist_scan(db: &mut Db, scan: &ScanResult) -> Result<PersistOutcome> {
    let entries = scan.entries().cloned().collect::<Vec<_>>();
    let entries_saved = if entries.is_empty() {
        0
    } else {
        db.save_entries(&entries)?
    };

    let processed_at = now_ms();
    let watermarks = scan
        .files
        .iter()
        .map(|file| file.watermark(processed_at))
        .collect::<Vec<_>>();
    if !watermarks.is_empty() {
        db.mark_files_processed(&watermarks)?;
    }
    debug!(
        entries_saved,
        watermarks = watermarks.len(),
        "persisted scan"
    );
    Ok(PersistOutcome {
        entries_saved,
        watermarks,
    })
}

/// One-shot ingest of every log file under `config_dirs`, ignoring any stored
/// watermarks.
pub fn ingest_config_dirs(db: &mut Db, config_dirs: &[PathBuf]) -> Result<IngestStats> {
    let started = Instant::now();
    let scan = full_scan(config_dirs);
    let outcome = persist_scan(db, &scan)?;
    let stats = IngestStats {
        entries_found: scan.entries_found(),
        entries_saved: outcome.entries_saved,
        files_processed: scan.files_processed,
        files_skipped: scan.files_skipped,
        errors: scan.all_errors(),
    };
    info!(
        entries_found = stats.entries_found,
        entries_saved = stats.entries_saved,
        files_processed = stats.files_processed,
        files_skipped = stats.files_skipped,
        errors = stats.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ingest complete"
    );
    Ok(stats)
}
