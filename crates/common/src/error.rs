use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    #[error("Remote fetch failed for {table}: {message}")]
    RemoteFetchError { table: String, message: String },

    #[error("Write failed for {table}: {message}")]
    WriteError { table: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn remote_fetch(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::RemoteFetchError {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn write(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::WriteError {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn is_remote_fetch(&self) -> bool {
        matches!(self, Error::RemoteFetchError { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_table() {
        let err = Error::remote_fetch("events", "404 Not Found");
        assert_eq!(err.to_string(), "Remote fetch failed for events: 404 Not Found");
        assert!(err.is_remote_fetch());

        let err = Error::write("events", "disk full");
        assert_eq!(err.to_string(), "Write failed for events: disk full");
        assert!(!err.is_remote_fetch());
    }
}
