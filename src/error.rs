
use thiserror::Error;

use crate::construct::Id;

#[derive(Error, Debug)]
pub enum PropsheetError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Unknown entity: {kind} {id} in scope {scope}")]
    UnknownEntity { kind: &'static str, id: Id, scope: String },
    #[error("Unknown transform: {0}")]
    UnknownTransform(String),
    #[error("Invalid option '{option}' for argument {argument}")]
    InvalidOption { argument: String, option: String },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Snapshot error: {0}")]
    Snapshot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PropsheetError>;

// Helper conversions
impl From<config::ConfigError> for PropsheetError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
