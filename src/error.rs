use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForemanError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ForemanError>;
