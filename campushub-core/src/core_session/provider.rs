//! The identity-provider seam.
//!
//! Token exchange lives outside this crate; the coordinator only needs a
//! point-in-time "current session" query for startup plus the event stream
//! consumed by the session manager.

use crate::core_store::model::{Timestamp, UserId};
use async_trait::async_trait;
use thiserror::Error;

/// A provider-reported session snapshot.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    /// The authenticated subject.
    pub subject_id: UserId,
    /// Display name as known to the provider.
    pub name: String,
    /// When the provider issued the session.
    pub issued_at: Timestamp,
}

/// Identity provider failures.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time session lookup against the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return the currently valid session, if one exists.
    async fn current_session(&self) -> Result<Option<ProviderSession>, ProviderError>;
}

/// A provider with a fixed answer, for startup paths in tests and demos.
pub struct StaticProvider {
    session: Option<ProviderSession>,
}

impl StaticProvider {
    /// A provider that reports no existing session.
    pub fn signed_out() -> Self {
        Self { session: None }
    }

    /// A provider that reports an existing session for `subject_id`.
    pub fn signed_in(subject_id: UserId, name: impl Into<String>) -> Self {
        Self {
            session: Some(ProviderSession {
                subject_id,
                name: name.into(),
                issued_at: Timestamp::now(),
            }),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticProvider {
    async fn current_session(&self) -> Result<Option<ProviderSession>, ProviderError> {
        Ok(self.session.clone())
    }
}

/// A provider whose lookup always fails, for startup fail-open tests.
pub struct UnavailableProvider;

#[async_trait]
impl IdentityProvider for UnavailableProvider {
    async fn current_session(&self) -> Result<Option<ProviderSession>, ProviderError> {
        Err(ProviderError::Unavailable("simulated outage".to_string()))
    }
}
