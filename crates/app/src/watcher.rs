//! Filesystem watcher for project log files.
//!
//! Native notifications are filtered to `.jsonl` paths and debounced per
//! path; each burst becomes one [`WatchEvent`] on a bounded channel. The
//! watcher never decides whether a file was created or deleted; consumers
//! check existence themselves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ingest::{PROJECTS_DIR, is_log_path};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{AppError, Result};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Capacity of the channel between the watcher and its consumer.
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

/// A debounced "this file changed" signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Stopped,
}

struct DebounceState {
    stopped: bool,
    next_generation: u64,
    timers: HashMap<PathBuf, (u64, JoinHandle<()>)>,
}

struct DebouncerInner {
    window: Duration,
    runtime: Handle,
    tx: mpsc::Sender<WatchEvent>,
    state: Mutex<DebounceState>,
    dropped: AtomicU64,
}

impl DebouncerInner {
    fn lock(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Sends while holding the lock so nothing slips out after `stop`.
    fn fire(&self, path: PathBuf, generation: u64) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        match state.timers.get(&path) {
            Some((current, _)) if *current == generation => {
                state.timers.remove(&path);
            }
            _ => return,
        }
        match self.tx.try_send(WatchEvent { path }) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let count = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % 100 == 0 {
                    warn!(
                        file = %event.path.display(),
                        dropped_total = count,
                        "watch channel full; event dropped"
                    );
                }
            }
            Err(TrySendError::Closed(event)) => {
                debug!(file = %event.path.display(), "watch channel closed");
            }
        }
    }
}

/// Per-path trailing-edge debouncer. Timers run on the tokio runtime it was
/// created with, so `touch` may be called from any thread.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<DebouncerInner>,
}

impl Debouncer {
    pub fn new(window: Duration, runtime: Handle, tx: mpsc::Sender<WatchEvent>) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                window,
                runtime,
                tx,
                state: Mutex::new(DebounceState {
                    stopped: false,
                    next_generation: 0,
                    timers: HashMap::new(),
                }),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Restarts the window for `path`.
    pub fn touch(&self, path: PathBuf) {
        let mut state = self.inner.lock();
        if state.stopped {
            return;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        if let Some((_, previous)) = state.timers.remove(&path) {
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        let key = path.clone();
        let timer = self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.window).await;
            inner.fire(key, generation);
        });
        state.timers.insert(path, (generation, timer));
    }

    /// Cancels every pending timer. No event is sent once this returns.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        for (_, (_, timer)) in state.timers.drain() {
            timer.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().timers.len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

// Files written into a new directory can land before the recursive watch on it
// is in place, so a created directory is swept for logs it already holds.
fn route_event(event: Event, debouncer: &Debouncer) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    let created = matches!(event.kind, EventKind::Create(_));
    for path in event.paths {
        if is_log_path(&path) {
            debouncer.touch(path);
        } else if created && path.is_dir() {
            for entry in WalkDir::new(&path).into_iter().filter_map(|entry| entry.ok()) {
                if entry.file_type().is_file() && is_log_path(entry.path()) {
                    debouncer.touch(entry.into_path());
                }
            }
        }
    }
}

fn watch_target(config_dir: &Path) -> PathBuf {
    let projects_dir = config_dir.join(PROJECTS_DIR);
    if projects_dir.is_dir() {
        projects_dir
    } else {
        config_dir.to_path_buf()
    }
}

/// Recursive watcher over the `projects/` trees of the configured directories.
pub struct LogWatcher {
    state: WatcherState,
    watcher: Option<RecommendedWatcher>,
    debouncer: Option<Debouncer>,
}

impl Default for LogWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LogWatcher {
    pub fn new() -> Self {
        Self {
            state: WatcherState::Idle,
            watcher: None,
            debouncer: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Subscribes to every directory in `config_dirs`. Must be called from
    /// within a tokio runtime. A directory that cannot be watched is logged
    /// and skipped.
    pub fn start(&mut self, config_dirs: &[PathBuf], tx: mpsc::Sender<WatchEvent>) -> Result<()> {
        match self.state {
            WatcherState::Watching => return Ok(()),
            WatcherState::Stopped => {
                return Err(AppError::Message("watcher already stopped".to_string()));
            }
            WatcherState::Idle => {}
        }
        let runtime = Handle::try_current()
            .map_err(|err| AppError::Message(format!("watcher needs a tokio runtime: {}", err)))?;
        let debouncer = Debouncer::new(DEBOUNCE_WINDOW, runtime, tx);
        let callback_debouncer = debouncer.clone();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => route_event(event, &callback_debouncer),
                Err(err) => error!(error = %err, "file watcher error"),
            },
        )?;

        let mut watched = 0usize;
        for config_dir in config_dirs {
            let target = watch_target(config_dir);
            match watcher.watch(&target, RecursiveMode::Recursive) {
                Ok(()) => {
                    watched += 1;
                    info!(dir = %target.display(), "watching for log changes");
                }
                Err(err) => {
                    warn!(dir = %target.display(), error = %err, "failed to watch directory");
                }
            }
        }
        if watched == 0 {
            warn!("no directories could be watched; relying on periodic scans");
        }

        self.watcher = Some(watcher);
        self.debouncer = Some(debouncer);
        self.state = WatcherState::Watching;
        Ok(())
    }

    /// Closes all subscriptions and cancels pending timers.
    pub fn stop(&mut self) {
        if self.state == WatcherState::Stopped {
            return;
        }
        drop(self.watcher.take());
        if let Some(debouncer) = &self.debouncer {
            debouncer.stop();
        }
        self.state = WatcherState::Stopped;
    }

    pub fn dropped_events(&self) -> u64 {
        self.debouncer
            .as_ref()
            .map(Debouncer::dropped_events)
            .unwrap_or(0)
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
