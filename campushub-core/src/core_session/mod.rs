//! Session management.
//!
//! A single-threaded actor owns authentication state and consumes an
//! ordered event stream from the identity provider, so observers never see
//! interleaved or out-of-order transitions. Profiles live in the store and
//! are resolved best-effort alongside the session.

mod error;
mod event;
mod manager;
mod profiles;
mod provider;
mod session;

pub use error::SessionError;
pub use event::{AuthEvent, AuthEventKind};
pub use manager::{spawn_session_manager, SessionHandle};
pub use profiles::ProfileStore;
pub use provider::{IdentityProvider, ProviderError, ProviderSession, StaticProvider, UnavailableProvider};
pub use session::{Profile, Role, Session, SessionSnapshot};
