//! Error types returned by the domain services

use std::fmt;
use thiserror::Error;

/// Broad classification of a [`ServiceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced entity does not exist
    NotFound,
    /// Malformed input or a uniqueness violation on write
    InvalidInput,
    /// The operation is forbidden in the entity's current state
    NotAllowed,
    /// A capacity constraint would be exceeded
    MaximumQuantity,
    /// The underlying store failed
    Database,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::InvalidInput => write!(f, "invalid input"),
            ErrorKind::NotAllowed => write!(f, "not allowed"),
            ErrorKind::MaximumQuantity => write!(f, "maximum quantity"),
            ErrorKind::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate value: {0}")]
    DuplicateValue(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Maximum quantity reached: {0}")]
    MaximumQuantity(String),

    #[error("Database error while {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidInput(_) | ServiceError::DuplicateValue(_) => {
                ErrorKind::InvalidInput
            }
            ServiceError::NotAllowed(_) => ErrorKind::NotAllowed,
            ServiceError::MaximumQuantity(_) => ErrorKind::MaximumQuantity,
            ServiceError::Database { .. } => ErrorKind::Database,
        }
    }

    pub fn database(context: impl Into<String>, source: anyhow::Error) -> Self {
        ServiceError::Database {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Faults raised by a transaction boundary itself (begin/commit/rollback)
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::database("running a transaction", err)
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Wraps repository results into [`ServiceError::Database`]
pub trait DbResultExt<T> {
    fn db<C, F>(self, context: F) -> ServiceResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> DbResultExt<T> for anyhow::Result<T> {
    fn db<C, F>(self, context: F) -> ServiceResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ServiceError::database(context(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_duplicate_value_is_invalid_input_kind() {
        let err = ServiceError::DuplicateValue("team 'Alpha' already exists".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_db_wraps_context_and_source() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("disk I/O error"));
        let err = result.db(|| "saving team 42").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(
            err.to_string(),
            "Database error while saving team 42: disk I/O error"
        );
        assert!(err.source().is_some());
    }
}
