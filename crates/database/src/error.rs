use crate::codec::CodecError;
use core_types::CoreError;
use thiserror::Error;

/// Stable classification of a [`DbError`], decided once when the error is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The lookup, update or delete target does not exist.
    NotFound,
    /// The create target is already present.
    AlreadyExists,
    /// `begin`/`commit`/`rollback` called out of sequence.
    TransactionState,
    /// The input was rejected before it reached the store.
    InvalidRecord,
    /// Any other failure: connectivity, constraints, (de)serialization.
    Transport,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStateError {
    #[error("a transaction is already in progress")]
    AlreadyInTransaction,
    #[error("no transaction is in progress")]
    NotInTransaction,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database connection configuration: {0}")]
    ConnectionConfigError(String),

    #[error("The requested record was not found in the database.")]
    NotFound,

    #[error("A record with the same name already exists.")]
    AlreadyExists,

    #[error("Transaction state error: {0}")]
    TransactionState(#[from] TransactionStateError),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] CoreError),

    /// Never construct this directly from a `sqlx::Error`; go through `From`.
    #[error("Database error: {0}")]
    Transport(#[source] sqlx::Error),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Password codec error: {0}")]
    Codec(#[from] CodecError),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound => ErrorKind::NotFound,
            DbError::AlreadyExists => ErrorKind::AlreadyExists,
            DbError::TransactionState(_) => ErrorKind::TransactionState,
            DbError::InvalidRecord(_) => ErrorKind::InvalidRecord,
            DbError::ConnectionConfigError(_)
            | DbError::Transport(_)
            | DbError::JsonError(_)
            | DbError::Codec(_) => ErrorKind::Transport,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// The one place backend errors enter the domain: the driver's "no row"
/// signal becomes `NotFound`, everything else passes through as `Transport`.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            other => DbError::Transport(other),
        }
    }
}

impl From<configuration::error::ConfigError> for DbError {
    fn from(err: configuration::error::ConfigError) -> Self {
        DbError::ConnectionConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_normalizes_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn other_backend_errors_pass_through() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Transport(sqlx::Error::PoolTimedOut)));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn kinds_for_domain_errors() {
        assert_eq!(DbError::AlreadyExists.kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            DbError::from(TransactionStateError::NotInTransaction).kind(),
            ErrorKind::TransactionState
        );
        let invalid = CoreError::InvalidInput("cluster".into(), "must not be empty".into());
        assert_eq!(DbError::from(invalid).kind(), ErrorKind::InvalidRecord);
    }
}
