//! Common identifier and timestamp types shared across the store models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// User identifier (the identity provider's subject id)
    UserId
);
string_id!(
    /// Unique identifier for a top-level college community
    CommunityId
);
string_id!(
    /// Unique identifier for a club within a community
    ClubId
);
string_id!(
    /// Unique identifier for a direct-mentorship chat room
    RoomId
);
string_id!(
    /// Unique identifier for a content item (post or message)
    ContentId
);

/// A container is the scope within which content ordering is defined:
/// a club's post feed or a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerId {
    /// A club post feed
    Club(ClubId),
    /// A chat room
    Room(RoomId),
}

impl ContainerId {
    /// The raw container id string, as stored in `content_items`.
    pub fn as_str(&self) -> &str {
        match self {
            ContainerId::Club(id) => id.as_str(),
            ContainerId::Room(id) => id.as_str(),
        }
    }

    /// The container kind discriminator stored alongside the id.
    pub fn kind(&self) -> &'static str {
        match self {
            ContainerId::Club(_) => "club",
            ContainerId::Room(_) => "room",
        }
    }

    /// Rebuild a container id from its stored (kind, id) pair.
    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "club" => Some(ContainerId::Club(ClubId::new(id))),
            "room" => Some(ContainerId::Room(RoomId::new(id))),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

/// The canonical ordering key for content within a container.
///
/// `created_at` alone is not unique under concurrent writers, so the
/// content id is the tiebreak. The derived `Ord` compares `created_at`
/// first, then `id` lexicographically, which gives every subscriber the
/// same total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub created_at: Timestamp,
    pub id: ContentId,
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.created_at)
    }
}
