use std::fmt;

/// Result type for foldwatch-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the types layer
#[derive(Debug)]
pub enum Error {
    /// Client settings failed validation (empty name, illegal characters, ...)
    InvalidClient(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidClient(msg) => write!(f, "Invalid client settings: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
