//! Error types for the publish pipeline

use crate::core_membership::MembershipError;
use crate::core_store::StoreError;
use thiserror::Error;

/// Errors that can fail a publish
#[derive(Debug, Error)]
pub enum PublishError {
    /// No session, or the claimed author is not the session subject
    #[error("not authenticated as the author")]
    Unauthenticated,

    /// Publishing to a club the author has not joined
    #[error("not a member of this club")]
    NotAMember,

    /// The target container does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MembershipError> for PublishError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::NotFound(what) => PublishError::NotFound(what),
            MembershipError::AlreadyMember | MembershipError::CommunityLimit => {
                // Joins issued by the publisher are idempotent; these two
                // cannot reach it.
                PublishError::NotAMember
            }
            MembershipError::Store(err) => PublishError::Store(err),
        }
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
