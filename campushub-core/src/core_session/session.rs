//! Session and profile types.

use crate::core_store::model::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role, stored on the profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Elevated via the admin secret at registration/login
    Admin,
    /// Offers mentorship
    Mentor,
    /// Default role for new accounts
    Junior,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Mentor => "mentor",
            Role::Junior => "junior",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "mentor" => Some(Role::Mentor),
            "junior" => Some(Role::Junior),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user profile, created lazily on first successful session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub mentorship_available: bool,
}

/// The authenticated session owned by the session manager.
///
/// Profile resolution is best-effort: `profile` is `None` when the fetch
/// failed, and the manager retries on the next resolve. A missing profile
/// never invalidates a valid session. Revocation is a state transition,
/// not a flag: a revoked session drops to `Unauthenticated` and only a
/// fresh sign-in event establishes a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub subject_id: UserId,
    pub profile: Option<Profile>,
    pub issued_at: Timestamp,
}

/// What the session manager currently knows about "who is signed in".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionSnapshot {
    /// Startup state, before the initial provider lookup completes.
    #[default]
    Unknown,
    /// A valid session exists.
    Authenticated(Session),
    /// No valid session.
    Unauthenticated,
}

impl SessionSnapshot {
    /// The current session, if authenticated.
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionSnapshot::Authenticated(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionSnapshot::Authenticated(_))
    }
}
