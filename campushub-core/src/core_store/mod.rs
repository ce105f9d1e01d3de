//! Persistent store for the coordinator
//!
//! A pooled SQLite database with versioned migrations, shared model types,
//! and a change feed that plays the role of row-level notifications. The
//! store's uniqueness constraints are the serialization points for the
//! membership and audit invariants.

pub mod error;
pub mod feed;
pub mod migrations;
pub mod model;
pub mod pool;

pub use error::{ConstraintKind, StoreError, StoreResult};
pub use feed::{ChangeFeed, ContentEvent};
pub use model::{
    ClubId, CommunityId, ContainerId, ContentId, ContentItem, ContentKey, ModerationStatus, RoomId,
    Timestamp, UserId,
};
pub use pool::{SqlitePool, Store};
