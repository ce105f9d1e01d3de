//! Content item model: a club post or a chat message.
//!
//! Content rows are append-only once created. The moderation status may
//! transition `pending -> {approved, flagged}` exactly once, and only the
//! moderation gate performs that transition.

use super::types::{ContainerId, ContentId, ContentKey, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Moderation state of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationStatus {
    /// Visible to every member of the container
    Approved,
    /// Visible only to the author and admins
    Flagged,
    /// Awaiting a decision (reserved for deferred moderation)
    Pending,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Approved => "approved",
            ModerationStatus::Flagged => "flagged",
            ModerationStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(ModerationStatus::Approved),
            "flagged" => Some(ModerationStatus::Flagged),
            "pending" => Some(ModerationStatus::Pending),
            _ => None,
        }
    }
}

/// A single piece of user-generated content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique content id
    pub id: ContentId,

    /// The club feed or chat room this item belongs to
    pub container: ContainerId,

    /// Author of the content
    pub author: UserId,

    /// The text body
    pub body: String,

    /// Moderation outcome recorded at publish time
    pub status: ModerationStatus,

    /// Reason attached by the moderation gate when flagged
    pub moderation_reason: Option<String>,

    /// Creation time; part of the canonical ordering key
    pub created_at: Timestamp,
}

impl ContentItem {
    /// The item's position in the container's canonical order.
    pub fn key(&self) -> ContentKey {
        ContentKey {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }
}
