use std::fmt;

/// Result type for foldwatch-history operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the history layer
#[derive(Debug)]
pub enum Error {
    /// Database operation failed
    Database(rusqlite::Error),

    /// A schema upgrade step failed; no partial version is committed
    Upgrade {
        version: i32,
        source: Box<Error>,
    },

    /// IO operation failed
    Io(std::io::Error),

    /// Query-specific error (invalid input, reserved name, ...)
    Query(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => {
                let msg = err.to_string();
                // Schema drift shows up as missing columns/tables; point the
                // operator at the migration path instead of the raw error.
                if msg.contains("no such column") || msg.contains("no such table") {
                    write!(
                        f,
                        "History schema mismatch: {}. Re-open the database to run migrations.",
                        msg
                    )
                } else {
                    write!(f, "Database error: {}", err)
                }
            }
            Error::Upgrade { version, source } => {
                write!(f, "Schema upgrade to version {} failed: {}", version, source)
            }
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Query(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Upgrade { source, .. } => Some(source),
            Error::Io(err) => Some(err),
            Error::Query(_) => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
