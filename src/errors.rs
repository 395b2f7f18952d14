use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Discovery failed: {0}")]
    Discovery(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Auth expired for account")]
    AuthExpired,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Unsubscribe action failed: {0}")]
    Action(String),
    #[error("Scan cancelled")]
    Cancelled,
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
