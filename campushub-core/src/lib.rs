//! CampusHub core: the realtime content & membership coordinator for a
//! college community platform.
//!
//! The crate owns the four pieces of the platform that carry real
//! coordination logic:
//!
//! - [`core_session`] — the authenticated-session state machine, driven by
//!   an ordered identity-provider event channel.
//! - [`core_membership`] — community/club/room membership with the
//!   single-community invariant enforced by the store.
//! - [`core_moderation`] — the fail-open moderation gate in front of every
//!   piece of user-generated content.
//! - [`core_content`] + [`core_sync`] — the single writer of canonical
//!   content order, and ordered, de-duplicated fanout to live viewers.
//!
//! Everything else the platform does (forms, navigation, profile editing,
//! dashboards) is a thin CRUD layer over the store and lives outside this
//! crate.

pub mod config;
pub mod core_content;
pub mod core_membership;
pub mod core_moderation;
pub mod core_session;
pub mod core_store;
pub mod core_sync;
pub mod logging;

pub use config::Config;
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
