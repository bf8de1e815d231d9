//! # Sample Errors
//!
//! Application-level error for the sample system. Dispatcher failures pass
//! through unchanged; startup adds configuration and I/O failures.

use action_dispatch::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<std::io::Error> for SampleError {
    fn from(e: std::io::Error) -> Self {
        SampleError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for SampleError {
    fn from(e: toml::de::Error) -> Self {
        SampleError::Config(e.to_string())
    }
}
