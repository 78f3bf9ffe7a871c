use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
    #[error("ingest error: {0}")]
    Ingest(#[from] ingest::IngestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
