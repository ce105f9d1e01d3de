//! Error types for the persistent store
//!
//! The store is the serialization point for every data-model invariant, so
//! callers need to distinguish three classes of failure: constraint
//! violations (translated per operation: duplicate key on a join is
//! `AlreadyMember`, on a leave it is success), transient busy/locked errors
//! (retry-safe), and permanent errors (surfaced).

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Which constraint a violating statement hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Primary-key or unique-index collision (duplicate key)
    Unique,
    /// Missing foreign-key target
    ForeignKey,
    /// CHECK or other constraint
    Other,
}

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a pooled connection
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Database busy or locked; the operation is retry-safe
    #[error("store busy: {0}")]
    Busy(String),

    /// A uniqueness, foreign-key, or check constraint rejected the write
    #[error("constraint violation ({kind:?}): {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    /// Any other SQLite failure; surfaced to the caller
    #[error("sqlite error: {0}")]
    Sqlite(String),
}

impl StoreError {
    /// True for errors where an immediate retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_) | StoreError::Pool(_))
    }

    /// True when the statement hit a duplicate-key constraint.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            StoreError::Constraint {
                kind: ConstraintKind::Unique,
                ..
            }
        )
    }

    /// True when the statement referenced a missing foreign-key target.
    pub fn is_missing_target(&self) -> bool {
        matches!(
            self,
            StoreError::Constraint {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;

        if let rusqlite::Error::SqliteFailure(ffi_err, ref message) = err {
            let message = message
                .clone()
                .unwrap_or_else(|| ffi_err.to_string());
            match ffi_err.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    return StoreError::Busy(message);
                }
                ErrorCode::ConstraintViolation => {
                    // Extended result codes distinguish which constraint
                    // failed: 1555 = PRIMARY KEY, 2067 = UNIQUE, 787 = FK.
                    let kind = match ffi_err.extended_code {
                        1555 | 2067 => ConstraintKind::Unique,
                        787 => ConstraintKind::ForeignKey,
                        _ => ConstraintKind::Other,
                    };
                    return StoreError::Constraint { kind, message };
                }
                _ => {}
            }
        }
        StoreError::Sqlite(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Pool(err.to_string())
    }
}
