//! # Database Error Types
//!
//! Error types for database operations and ledger services.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← Adds context and categorization                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError ← DbError | ValidationError | CoreError                   │
//! │       │         (returned by PaymentLedger / SaleLifecycle)            │
//! │       ▼                                                                 │
//! │  ApiError (khata-server) ← status code + JSON body                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use khata_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Deleting a payment or sale that does not exist
    /// - Adding a batch to an unknown product
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate invoice number
    /// - A payment allocated twice to the same invoice
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Sale or payment for a non-existent customer
    /// - Deleting a customer that still has invoices or payments
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed (including CHECK constraint failures).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    ///
    /// ## When This Occurs
    /// - An invoice row changed between read and conditional update
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

}

/// Maps sqlx errors onto the ledger's categories.
///
/// ```text
/// RowNotFound              → NotFound
/// unique violation         → UniqueViolation
/// foreign key violation    → ForeignKeyViolation
/// other database errors    → QueryFailed (CHECK failures land here)
/// PoolTimedOut             → PoolExhausted
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err
                    .message()
                    .rsplit(": ")
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                DbError::UniqueViolation { constraint }
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                DbError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                }
            }
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger Error
// =============================================================================

/// Errors returned by the ledger services.
///
/// Validation and rule failures are raised before any write; a `Db` error
/// mid-operation rolls the whole transaction back.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rule(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl LedgerError {
    /// Shorthand for a NotFound database error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::Db(DbError::not_found(entity, id))
    }

    /// Whether this error means a referenced entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::Db(DbError::NotFound { .. }))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(err.into())
    }
}

/// Result type for ledger service operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
