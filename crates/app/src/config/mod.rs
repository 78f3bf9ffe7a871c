use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::AppConfig;
use crate::error::Result;

/// Loads `AppConfig` from TOML. A missing file yields the defaults.
pub fn load_app_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub project: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyParams {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub project: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub project: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub project: Option<String>,
}
