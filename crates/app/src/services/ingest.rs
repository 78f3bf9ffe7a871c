use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ingest::{
    ScanError, ScanResult, full_scan, incremental_scan, locate_file, persist_scan,
    scan_changed_file,
};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use usage_core::ProcessedFile;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};
use crate::watcher::{LogWatcher, WATCH_CHANNEL_CAPACITY, WatchEvent};

type ProcessedMap = HashMap<String, ProcessedFile>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    Startup,
    Periodic,
    Watch,
    Manual,
    FullRescan,
}

/// Outcome of one scan, returned to whoever triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub trigger: ScanTrigger,
    pub entries_found: usize,
    pub entries_saved: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub errors: Vec<ScanError>,
}

impl ScanReport {
    fn new(trigger: ScanTrigger, scan: &ScanResult, entries_saved: usize) -> Self {
        Self {
            trigger,
            entries_found: scan.entries_found(),
            entries_saved,
            files_processed: scan.files_processed,
            files_skipped: scan.files_skipped,
            errors: scan.all_errors(),
        }
    }

    fn empty(trigger: ScanTrigger) -> Self {
        Self {
            trigger,
            entries_found: 0,
            entries_saved: 0,
            files_processed: 0,
            files_skipped: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    watcher: Option<LogWatcher>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: SharedConfig,
    config_dirs: Vec<PathBuf>,
    // Holding this lock is what makes a scan single-flight.
    processed: Mutex<ProcessedMap>,
    lifecycle: Mutex<Lifecycle>,
    initialized: AtomicBool,
}

/// Coordinates startup, periodic, watch-triggered and manual scans over one
/// shared watermark map.
#[derive(Clone)]
pub struct IngestionService {
    inner: Arc<Inner>,
}

impl IngestionService {
    pub(super) fn new(config: SharedConfig) -> Self {
        let config_dirs = config.resolved_config_dirs();
        Self {
            inner: Arc::new(Inner {
                config,
                config_dirs,
                processed: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn config_dirs(&self) -> &[PathBuf] {
        &self.inner.config_dirs
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Loads watermarks, runs the startup scan, then starts the timer and the
    /// watcher. Calling it again while initialized does nothing.
    pub async fn initialize(&self) -> Result<Option<ScanReport>> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.is_initialized() {
            debug!("ingestion service already initialized");
            return Ok(None);
        }
        if self.inner.config_dirs.is_empty() {
            warn!("no config directories found; nothing to ingest until one appears");
        }

        let config = Arc::clone(&self.inner.config);
        let stored = tokio::task::spawn_blocking(move || -> Result<ProcessedMap> {
            let mut db = open_db(&config)?;
            db.migrate()?;
            Ok(db.get_processed_files()?)
        })
        .await??;
        let mut processed = self.inner.processed.lock().await;
        *processed = stored;
        let report = if self.inner.config.scan_on_startup {
            let dirs = self.inner.config_dirs.clone();
            Some(
                self.scan_and_persist(&mut processed, ScanTrigger::Startup, move || {
                    full_scan(&dirs)
                })
                .await?,
            )
        } else {
            None
        };
        drop(processed);

        let cancel = CancellationToken::new();
        if self.inner.config.watch_enabled {
            let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
            let mut watcher = LogWatcher::new();
            watcher.start(&self.inner.config_dirs, tx)?;
            lifecycle.watcher = Some(watcher);
            lifecycle
                .tasks
                .push(tokio::spawn(watch_loop(self.clone(), rx, cancel.clone())));
        }
        if let Some(interval) = self.inner.config.scan_interval() {
            lifecycle.tasks.push(tokio::spawn(periodic_loop(
                self.clone(),
                interval,
                cancel.clone(),
            )));
        }
        lifecycle.cancel = Some(cancel);
        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(
            dirs = self.inner.config_dirs.len(),
            watch = self.inner.config.watch_enabled,
            interval_ms = self.inner.config.scan_interval_ms,
            "ingestion service initialized"
        );
        Ok(report)
    }

    /// Stops the watcher and timer, waiting for any in-flight scan to finish.
    /// Calling it while not initialized does nothing.
    pub async fn dispose(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if !self.is_initialized() {
            return;
        }
        if let Some(mut watcher) = lifecycle.watcher.take() {
            watcher.stop();
            let dropped = watcher.dropped_events();
            if dropped > 0 {
                info!(dropped, "watch events dropped during this run");
            }
        }
        if let Some(cancel) = lifecycle.cancel.take() {
            cancel.cancel();
        }
        for task in lifecycle.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "ingestion task ended abnormally");
            }
        }
        self.inner.initialized.store(false, Ordering::SeqCst);
        info!("ingestion service disposed");
    }

    /// Incremental scan of every file; waits for any scan in flight.
    pub async fn scan_now(&self) -> Result<ScanReport> {
        self.require_initialized()?;
        let mut processed = self.inner.processed.lock().await;
        self.incremental(&mut processed, ScanTrigger::Manual).await
    }

    /// Re-reads every file from line 0. Entries are upserted, so nothing is
    /// duplicated.
    pub async fn full_rescan(&self) -> Result<ScanReport> {
        self.require_initialized()?;
        let mut processed = self.inner.processed.lock().await;
        let dirs = self.inner.config_dirs.clone();
        self.scan_and_persist(&mut processed, ScanTrigger::FullRescan, move || {
            full_scan(&dirs)
        })
        .await
    }

    /// Reacts to a debounced change of `path`: drops its data when the file is
    /// gone, otherwise reads it past its watermark.
    pub async fn handle_file_change(&self, path: &Path) -> Result<ScanReport> {
        let mut processed = self.inner.processed.lock().await;
        let file_path = path.to_string_lossy().to_string();

        if !path.exists() {
            let config = Arc::clone(&self.inner.config);
            let target = file_path.clone();
            let removed = tokio::task::spawn_blocking(move || -> Result<usize> {
                let mut db = open_db(&config)?;
                Ok(db.delete_entries_from_file(&target)?)
            })
            .await??;
            processed.remove(&file_path);
            info!(file = %file_path, removed, "source file deleted; entries removed");
            return Ok(ScanReport::empty(ScanTrigger::Watch));
        }

        let Some(file) = locate_file(&self.inner.config_dirs, path) else {
            debug!(file = %file_path, "change outside scanned directories ignored");
            return Ok(ScanReport::empty(ScanTrigger::Watch));
        };
        let prior = processed
            .get(&file_path)
            .map(|found| HashMap::from([(file_path.clone(), found.clone())]))
            .unwrap_or_default();
        self.scan_and_persist(&mut processed, ScanTrigger::Watch, move || {
            scan_changed_file(file, &prior)
        })
        .await
    }

    pub async fn processed_files(&self) -> ProcessedMap {
        self.inner.processed.lock().await.clone()
    }

    pub async fn processed_file(&self, file_path: &str) -> Option<ProcessedFile> {
        self.inner.processed.lock().await.get(file_path).cloned()
    }

    /// Runs a periodic scan unless another scan holds the lock.
    pub(crate) async fn periodic_tick(&self) -> Option<ScanReport> {
        let Ok(mut processed) = self.inner.processed.try_lock() else {
            debug!("scan in flight; skipping periodic tick");
            return None;
        };
        match self.incremental(&mut processed, ScanTrigger::Periodic).await {
            Ok(report) => Some(report),
            Err(err) => {
                error!(error = %err, "periodic scan failed");
                None
            }
        }
    }

    fn require_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AppError::Message(
                "ingestion service is not initialized".to_string(),
            ))
        }
    }

    async fn incremental(
        &self,
        processed: &mut MutexGuard<'_, ProcessedMap>,
        trigger: ScanTrigger,
    ) -> Result<ScanReport> {
        let dirs = self.inner.config_dirs.clone();
        let snapshot = (**processed).clone();
        self.scan_and_persist(processed, trigger, move || {
            incremental_scan(&dirs, &snapshot)
        })
        .await
    }

    // Watermarks reach the map only after `persist_scan` has committed them.
    async fn scan_and_persist<F>(
        &self,
        processed: &mut MutexGuard<'_, ProcessedMap>,
        trigger: ScanTrigger,
        scan: F,
    ) -> Result<ScanReport>
    where
        F: FnOnce() -> ScanResult + Send + 'static,
    {
        let started = Instant::now();
        let config = Arc::clone(&self.inner.config);
        let (result, outcome) = tokio::task::spawn_blocking(move || -> Result<_> {
            let result = scan();
            let mut db = open_db(&config)?;
            let outcome = persist_scan(&mut db, &result)?;
            Ok((result, outcome))
        })
        .await??;

        for watermark in outcome.watermarks {
            processed.insert(watermark.file_path.clone(), watermark);
        }
        let report = ScanReport::new(trigger, &result, outcome.entries_saved);
        for err in &report.errors {
            debug!(
                file = %err.file_path,
                line = ?err.line_number,
                error = %err.message,
                "scan error"
            );
        }
        let noteworthy = report.files_processed > 0 || !report.errors.is_empty();
        if noteworthy {
            info!(
                trigger = ?trigger,
                entries_found = report.entries_found,
                entries_saved = report.entries_saved,
                files_processed = report.files_processed,
                files_skipped = report.files_skipped,
                errors = report.errors.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scan complete"
            );
        } else {
            debug!(trigger = ?trigger, files_skipped = report.files_skipped, "scan found nothing new");
        }
        Ok(report)
    }
}

async fn periodic_loop(service: IngestionService, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                service.periodic_tick().await;
            }
        }
    }
    debug!("periodic scan loop stopped");
}

async fn watch_loop(
    service: IngestionService,
    mut rx: mpsc::Receiver<WatchEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    if let Err(err) = service.handle_file_change(&event.path).await {
                        error!(file = %event.path.display(), error = %err, "watch-triggered scan failed");
                    }
                }
                None => break,
            }
        }
    }
    debug!("watch loop stopped");
}
