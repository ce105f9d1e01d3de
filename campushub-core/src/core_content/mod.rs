//! Content publishing and storage.
//!
//! The publisher runs the full pipeline for a club post or chat message:
//! session, membership, moderation, atomic insert, change-feed signal,
//! audit. The store half answers the ordered range queries `core_sync`
//! is built on.

mod error;
mod publisher;
mod storage;

pub use error::{PublishError, PublishResult};
pub use publisher::ContentPublisher;
pub use storage::ContentStore;
