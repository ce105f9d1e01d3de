//! Error types for the membership ledger

use crate::core_store::StoreError;
use thiserror::Error;

/// Errors that can occur mutating or querying memberships
#[derive(Debug, Error)]
pub enum MembershipError {
    /// The single-community invariant: a user belongs to at most one
    /// community at a time.
    #[error("user already belongs to a community")]
    CommunityLimit,

    /// Join of a club the user is already in
    #[error("already a member")]
    AlreadyMember,

    /// The referenced community, club, or room does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw SQLite errors go through the store taxonomy first, so the ledger's
/// duplicate-key and missing-target translations see classified errors.
impl From<rusqlite::Error> for MembershipError {
    fn from(err: rusqlite::Error) -> Self {
        MembershipError::Store(err.into())
    }
}

pub type MembershipResult<T> = Result<T, MembershipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sqlite_error_wraps_as_classified_store_error() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err: MembershipError = raw.into();
        assert!(matches!(err, MembershipError::Store(ref inner) if inner.is_transient()));
    }
}
