use std::path::{Path, PathBuf};

use crate::Result;

const APP_DIR_NAME: &str = "usage-tracker";
const DB_FILE_NAME: &str = "usage.sqlite";

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let db_path = app_data_dir.join(DB_FILE_NAME);
        Self {
            app_data_dir,
            db_path,
        }
    }

    /// `<data dir>/usage-tracker`, or a relative `usage-tracker` when the
    /// platform has no data directory.
    pub fn default_location() -> Self {
        let base = dirs::data_dir().unwrap_or_default();
        Self::new(base.join(APP_DIR_NAME))
    }
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    Ok(())
}

pub fn ensure_db_parent(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
