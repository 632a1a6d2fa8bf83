mod context;
mod exit_codes;
mod format;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacedError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(String),

    #[error("Invalid cooldown value: {0}")]
    InvalidCooldown(String),

    #[error("Cache key {0} is not open")]
    CacheNotOpen(String),

    #[error("Cache bookkeeping is inconsistent: {0}")]
    CacheInconsistent(String),

    #[error("Cache source failed: {0}")]
    CacheSource(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Probe observed a violation: {0}")]
    ProbeViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PacedError {
    /// Wraps an error raised by a cache source.
    pub fn from_source<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        PacedError::CacheSource(err.into())
    }
}

pub type Result<T> = std::result::Result<T, PacedError>;
