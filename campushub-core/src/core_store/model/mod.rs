//! Shared data-model types for the persistent store.

pub mod content;
pub mod types;

pub use content::{ContentItem, ModerationStatus};
pub use types::{
    ClubId, CommunityId, ContainerId, ContentId, ContentKey, RoomId, Timestamp, UserId,
};
