//! Membership data types.

use crate::core_store::model::{ClubId, CommunityId, RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A top-level college community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub college_name: String,
    pub created_by: Option<UserId>,
    pub created_at: Timestamp,
}

/// A club within a community. Clubs carry ordered post feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: ClubId,
    pub name: String,
    pub description: Option<String>,
    pub community_id: CommunityId,
    pub created_by: Option<UserId>,
    pub created_at: Timestamp,
}

/// A direct-mentorship chat room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_by: Option<UserId>,
    pub created_at: Timestamp,
}

/// Result of club creation.
///
/// The creator's membership is best-effort: when the secondary join fails
/// the club still exists and `creator_joined` is false. The reconciliation
/// pass backfills such clubs later.
#[derive(Debug, Clone)]
pub struct CreatedClub {
    pub club: Club,
    pub creator_joined: bool,
}

/// Result of room creation, with the same best-effort creator join.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: Room,
    pub creator_joined: bool,
}
