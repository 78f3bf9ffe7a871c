use std::path::{Path, PathBuf};
use std::time::Duration;

use ingest::{default_config_dirs, override_from_env, resolve_config_dirs};
use serde::{Deserialize, Serialize};
use usage_db::Db;

use crate::error::{AppError, Result};
use crate::services::{AppServices, ScanReport};
use crate::startup::{AppPaths, ensure_db_parent};

pub const DEFAULT_SCAN_INTERVAL_MS: i64 = 60_000;

/// Runtime options for the ingestion daemon.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub watch_enabled: bool,
    pub scan_on_startup: bool,
    /// Zero or negative disables periodic scanning.
    pub scan_interval_ms: i64,
    /// Ordered override list; empty defers to `CLAUDE_CONFIG_DIR`.
    pub config_dirs: Vec<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: AppPaths::default_location().db_path,
            watch_enabled: false,
            scan_on_startup: true,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            config_dirs: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval_ms > 0).then(|| Duration::from_millis(self.scan_interval_ms as u64))
    }

    /// Existing directories to scan, overrides first.
    pub fn resolved_config_dirs(&self) -> Vec<PathBuf> {
        let overrides = if self.config_dirs.is_empty() {
            override_from_env()
        } else {
            self.config_dirs.clone()
        };
        resolve_config_dirs(&overrides, &default_config_dirs())
    }
}

/// Application state shared by frontends (daemon binary, tests).
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn setup_db(&self) -> Result<()> {
        setup_db(&self.config.db_path)
    }

    pub fn open_db(&self) -> Result<Db> {
        Ok(Db::open(&self.config.db_path)?)
    }

    pub async fn initialize(&self) -> Result<Option<ScanReport>> {
        self.setup_db()
            .map_err(|err| AppError::Message(format!("initialize db: {}", err)))?;
        self.services.ingestion.initialize().await
    }

    pub async fn dispose(&self) {
        self.services.ingestion.dispose().await;
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    ensure_db_parent(path)?;
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
