mod analytics;
mod ingest;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::error::Result;
use usage_db::Db;

pub use analytics::{AnalyticsService, MAX_PAGE_LIMIT, SessionPage};
pub use ingest::{IngestionService, ScanReport, ScanTrigger};

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub analytics: AnalyticsService,
    pub ingestion: IngestionService,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let shared = Arc::new(config.clone());
        Self {
            analytics: AnalyticsService::new(shared.clone()),
            ingestion: IngestionService::new(shared),
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open(&config.db_path)?)
}
