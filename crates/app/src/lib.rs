pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;
pub mod startup;
pub mod util;
pub mod watcher;

pub use app::{AppConfig, AppState};
pub use config::{BlockParams, DailyParams, MonthlyParams, SessionParams, load_app_config};
pub use error::{AppError, Result};
pub use logging::init_logging;
pub use services::{AppServices, IngestionService, ScanReport, ScanTrigger, SessionPage};
pub use startup::{AppPaths, ensure_app_data_dir};
pub use watcher::{
    DEBOUNCE_WINDOW, Debouncer, LogWatcher, WATCH_CHANNEL_CAPACITY, WatchEvent, WatcherState,
};
