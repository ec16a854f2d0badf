//! Error types for the provenance registry
//!
//! Raw driver errors are classified exactly once, in [`classify_pg_error`]
//! and [`classify_sqlite_error`]. Callers above the storage adapters only
//! ever see the typed variants below.
//!
//! Ownership conflicts are not errors: a tier reports them as
//! [`super::InsertOutcome::Existing`] and the resolver as
//! [`crate::domain::RejectionReason::Conflict`].

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while verifying or registering ownership
#[derive(Error, Debug)]
pub enum ProvenanceError {
    /// Content could not be read for hashing
    #[error("hash error: {0}")]
    Hash(String),

    /// Fingerprint text did not decode to 32 bytes
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Ledger transport failure
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Ledger authority refused the write
    #[error("ledger rejected registration: {0}")]
    LedgerRejected(String),

    /// Ledger call exceeded the resolver deadline. The transaction may or
    /// may not have been recorded, so this is not retryable.
    #[error("ledger call timed out after {0:?}")]
    LedgerTimeout(Duration),

    /// Proof table does not exist in the tier
    #[error("store schema missing: {0}")]
    StoreSchemaMissing(String),

    /// Tier refused access to the proof table
    #[error("store access restricted: {0}")]
    StoreAccessRestricted(String),

    /// Transient tier fault (connection, pool, lock contention)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Ownership cannot be determined
    #[error("ownership verification temporarily unavailable")]
    DataUnavailable,

    /// Database error that is not one of the recoverable classes
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProvenanceError {
    /// Schema missing, access restricted or transient fault.
    ///
    /// These are the only errors that may trigger tier fallback.
    pub fn is_recoverable_unavailable(&self) -> bool {
        matches!(
            self,
            ProvenanceError::StoreSchemaMissing(_)
                | ProvenanceError::StoreAccessRestricted(_)
                | ProvenanceError::StoreUnavailable(_)
        )
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProvenanceError::DataUnavailable
                | ProvenanceError::StoreUnavailable(_)
                | ProvenanceError::LedgerUnavailable(_)
        )
    }

    /// Short stable label, used for metrics and span fields
    pub fn kind(&self) -> &'static str {
        match self {
            ProvenanceError::Hash(_) => "hash_error",
            ProvenanceError::InvalidFingerprint(_) => "invalid_fingerprint",
            ProvenanceError::LedgerUnavailable(_) => "ledger_unavailable",
            ProvenanceError::LedgerRejected(_) => "ledger_rejected",
            ProvenanceError::LedgerTimeout(_) => "ledger_timeout",
            ProvenanceError::StoreSchemaMissing(_) => "store_schema_missing",
            ProvenanceError::StoreAccessRestricted(_) => "store_access_restricted",
            ProvenanceError::StoreUnavailable(_) => "store_unavailable",
            ProvenanceError::DataUnavailable => "data_unavailable",
            ProvenanceError::Database(_) => "database",
            ProvenanceError::Configuration(_) => "configuration",
            ProvenanceError::Internal(_) => "internal",
        }
    }
}

/// Result type for provenance operations
pub type Result<T> = std::result::Result<T, ProvenanceError>;

/// Classify a PostgreSQL error into the closed taxonomy.
pub fn classify_pg_error(err: sqlx::Error) -> ProvenanceError {
    match &err {
        sqlx::Error::Io(e) => ProvenanceError::StoreUnavailable(e.to_string()),
        sqlx::Error::PoolTimedOut => {
            ProvenanceError::StoreUnavailable("connection pool timed out".to_string())
        }
        sqlx::Error::PoolClosed => {
            ProvenanceError::StoreUnavailable("connection pool closed".to_string())
        }
        sqlx::Error::Tls(e) => ProvenanceError::StoreUnavailable(e.to_string()),
        sqlx::Error::Database(db_err) => {
            let code = db_err
                .code()
                .map(|c| c.into_owned())
                .unwrap_or_default();
            let message = db_err.message().to_string();
            match code.as_str() {
                // undefined_table, invalid_schema_name
                "42P01" | "3F000" => ProvenanceError::StoreSchemaMissing(message),
                // insufficient_privilege
                "42501" => ProvenanceError::StoreAccessRestricted(message),
                // invalid_authorization_specification, invalid_password
                c if c.starts_with("28") => ProvenanceError::StoreAccessRestricted(message),
                // connection exception, operator intervention, insufficient resources
                c if c.starts_with("08") || c.starts_with("57") || c.starts_with("53") => {
                    ProvenanceError::StoreUnavailable(message)
                }
                _ => ProvenanceError::Database(err),
            }
        }
        _ => ProvenanceError::Database(err),
    }
}

/// Classify a SQLite error into the closed taxonomy.
///
/// SQLite reports extended result codes; the primary code is the low byte.
pub fn classify_sqlite_error(err: sqlx::Error) -> ProvenanceError {
    match &err {
        sqlx::Error::Io(e) => ProvenanceError::StoreUnavailable(e.to_string()),
        sqlx::Error::PoolTimedOut => {
            ProvenanceError::StoreUnavailable("connection pool timed out".to_string())
        }
        sqlx::Error::PoolClosed => {
            ProvenanceError::StoreUnavailable("connection pool closed".to_string())
        }
        sqlx::Error::Database(db_err) => {
            let primary = db_err
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| c & 0xff)
                .unwrap_or(-1);
            let message = db_err.message().to_string();
            match primary {
                // SQLITE_ERROR is generic; a missing table is the only schema case
                1 if message.starts_with("no such table") => {
                    ProvenanceError::StoreSchemaMissing(message)
                }
                // SQLITE_PERM, SQLITE_READONLY, SQLITE_AUTH
                3 | 8 | 23 => ProvenanceError::StoreAccessRestricted(message),
                // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN
                5 | 6 | 14 => ProvenanceError::StoreUnavailable(message),
                _ => ProvenanceError::Database(err),
            }
        }
        _ => ProvenanceError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classes() {
        assert!(ProvenanceError::StoreSchemaMissing("x".into()).is_recoverable_unavailable());
        assert!(ProvenanceError::StoreAccessRestricted("x".into()).is_recoverable_unavailable());
        assert!(ProvenanceError::StoreUnavailable("x".into()).is_recoverable_unavailable());
        assert!(!ProvenanceError::DataUnavailable.is_recoverable_unavailable());
        assert!(!ProvenanceError::LedgerRejected("no".into()).is_recoverable_unavailable());
    }

    #[test]
    fn test_terminal_errors_not_retryable() {
        assert!(!ProvenanceError::Hash("eof".into()).is_retryable());
        assert!(!ProvenanceError::LedgerRejected("revert".into()).is_retryable());
        assert!(!ProvenanceError::LedgerTimeout(Duration::from_secs(1)).is_retryable());
        assert!(ProvenanceError::LedgerUnavailable("reset".into()).is_retryable());
        assert!(ProvenanceError::DataUnavailable.is_retryable());
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(matches!(
            classify_pg_error(sqlx::Error::PoolTimedOut),
            ProvenanceError::StoreUnavailable(_)
        ));
        assert!(matches!(
            classify_sqlite_error(sqlx::Error::PoolClosed),
            ProvenanceError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_row_not_found_is_not_recoverable() {
        let err = classify_pg_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, ProvenanceError::Database(_)));
        assert!(!err.is_recoverable_unavailable());
    }

    #[test]
    fn test_unavailable_message_leaks_nothing() {
        assert_eq!(
            ProvenanceError::DataUnavailable.to_string(),
            "ownership verification temporarily unavailable"
        );
    }
}
