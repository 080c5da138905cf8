use shared::error::SchemaError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("sheet export did not arrive within {0:?}")]
    Timeout(Duration),
    #[error("fetch cancelled by shutdown")]
    Cancelled,
    #[error("sheet export does not match its column layout: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum MainError {
    #[error(transparent)]
    Init(#[from] shared::error::InitializationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}
