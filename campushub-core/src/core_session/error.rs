//! Error types for the session layer

use thiserror::Error;

/// Errors that can occur resolving or mutating the session
#[derive(Debug, Error)]
pub enum SessionError {
    /// No valid authenticated session
    #[error("no authenticated session")]
    Unauthenticated,

    /// A sign-in supplied an admin code that does not match the configured
    /// secret. Hard failure: the sign-in is rejected outright.
    #[error("admin secret mismatch")]
    AdminSecretMismatch,

    /// The session manager task is gone
    #[error("session manager unavailable")]
    Unavailable,

    /// Identity provider failure
    #[error("identity provider error: {0}")]
    Provider(String),
}
