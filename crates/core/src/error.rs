//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid retention policy: {0}")]
    InvalidPolicy(String),

    #[error("unknown property mapping kind {0}")]
    UnknownMapping(i32),

    #[error("unknown resource state {0}")]
    UnknownState(i32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
