//! Identity-provider lifecycle events.
//!
//! Events carry a provider-assigned sequence number. The session manager
//! applies them in sequence order and discards anything at or below the
//! last applied sequence, so a stale `SignedIn` that arrives after a
//! `SignedOut` can never resurrect the session.

use crate::core_store::model::UserId;

/// A session lifecycle event from the identity provider.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    /// Provider-assigned sequence number; the ordering authority.
    pub seq: u64,
    /// What happened.
    pub kind: AuthEventKind,
}

/// The kinds of session lifecycle transition the provider reports.
#[derive(Debug, Clone)]
pub enum AuthEventKind {
    /// Credentials were validated for this subject.
    SignedIn {
        subject_id: UserId,
        name: String,
        /// Admin code supplied at registration/login, if any. Checked
        /// against the configured admin secret.
        admin_code: Option<String>,
    },
    /// The subject signed out (or the provider revoked the session).
    SignedOut,
    /// The provider refreshed the token for an already-authenticated
    /// subject. Not a re-authentication.
    TokenRefreshed { subject_id: UserId },
}

impl AuthEvent {
    pub fn signed_in(seq: u64, subject_id: UserId, name: impl Into<String>) -> Self {
        AuthEvent {
            seq,
            kind: AuthEventKind::SignedIn {
                subject_id,
                name: name.into(),
                admin_code: None,
            },
        }
    }

    pub fn signed_in_with_code(
        seq: u64,
        subject_id: UserId,
        name: impl Into<String>,
        admin_code: impl Into<String>,
    ) -> Self {
        AuthEvent {
            seq,
            kind: AuthEventKind::SignedIn {
                subject_id,
                name: name.into(),
                admin_code: Some(admin_code.into()),
            },
        }
    }

    pub fn signed_out(seq: u64) -> Self {
        AuthEvent {
            seq,
            kind: AuthEventKind::SignedOut,
        }
    }

    pub fn token_refreshed(seq: u64, subject_id: UserId) -> Self {
        AuthEvent {
            seq,
            kind: AuthEventKind::TokenRefreshed { subject_id },
        }
    }
}
