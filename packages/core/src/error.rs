use std::fmt;
use std::error::Error;

/// Unified startup / process-level error.
///
/// Request-level failures are typed in `schedule::error`; this covers what
/// can stop the service itself (config, database, listener).
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Database(String),
    Server(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Server(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Server(err.to_string())
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError::Server(format!("metrics registry: {}", err))
    }
}
