//! The membership ledger.
//!
//! Every invariant check is a compare-and-insert: the unique constraint in
//! the store is the serialization point, never a read followed by a write.
//! Two devices racing the same join resolve at the insert, and the loser
//! gets a duplicate-key error translated per operation class: joins map it
//! to a domain error (or success, for auto-join rooms), leaves are
//! idempotent deletes.

use rusqlite::{params, OptionalExtension, Row};

use super::error::{MembershipError, MembershipResult};
use super::types::{Club, Community, CreatedClub, CreatedRoom, Room};
use crate::core_store::model::{ClubId, CommunityId, ContainerId, RoomId, Timestamp, UserId};
use crate::core_store::{Store, StoreResult};

/// SQL-backed membership ledger. Cheap to clone.
#[derive(Clone)]
pub struct MembershipLedger {
    store: Store,
}

impl MembershipLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    // ---- communities ----

    /// Create a community.
    pub async fn create_community(
        &self,
        name: &str,
        college_name: &str,
        created_by: Option<&UserId>,
    ) -> MembershipResult<Community> {
        let community = Community {
            id: CommunityId::generate(),
            name: name.to_string(),
            college_name: college_name.to_string(),
            created_by: created_by.cloned(),
            created_at: Timestamp::now(),
        };
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO communities (id, name, college_name, created_by, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                community.id.as_str(),
                &community.name,
                &community.college_name,
                community.created_by.as_ref().map(|u| u.as_str()),
                community.created_at.as_millis() as i64,
            ],
        )?;
        tracing::info!(community_id = %community.id, name = %community.name, "community created");
        Ok(community)
    }

    /// Join a community.
    ///
    /// At most one community per user; a second join (including a
    /// concurrent one from another device) loses at the insert and maps to
    /// `CommunityLimit`.
    pub async fn join_community(
        &self,
        user_id: &UserId,
        community_id: &CommunityId,
    ) -> MembershipResult<()> {
        let conn = self.store.conn()?;
        let result = conn.execute(
            "INSERT INTO community_memberships (user_id, community_id, joined_at)
             VALUES (?, ?, ?)",
            params![
                user_id.as_str(),
                community_id.as_str(),
                Timestamp::now().as_millis() as i64,
            ],
        );
        match result {
            Ok(_) => {
                tracing::info!(user_id = %user_id, community_id = %community_id, "joined community");
                Ok(())
            }
            Err(err) => {
                let err: crate::core_store::StoreError = err.into();
                if err.is_duplicate_key() {
                    Err(MembershipError::CommunityLimit)
                } else if err.is_missing_target() {
                    Err(MembershipError::NotFound("community"))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Leave the current community. Idempotent: no membership is success.
    pub async fn leave_community(&self, user_id: &UserId) -> MembershipResult<()> {
        self.delete_idempotent(
            "DELETE FROM community_memberships WHERE user_id = ?",
            &[user_id.as_str()],
        )?;
        Ok(())
    }

    /// The community a user currently belongs to, if any.
    pub async fn community_of(&self, user_id: &UserId) -> MembershipResult<Option<CommunityId>> {
        let conn = self.store.conn()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT community_id FROM community_memberships WHERE user_id = ?",
                params![user_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(CommunityId::new))
    }

    // ---- clubs ----

    /// Create a club, then best-effort join the creator.
    ///
    /// A failed creator join does not roll back the club; it is reported in
    /// `creator_joined` and picked up by [`reconcile_creator_memberships`].
    ///
    /// [`reconcile_creator_memberships`]: Self::reconcile_creator_memberships
    pub async fn create_club(
        &self,
        name: &str,
        description: Option<&str>,
        community_id: &CommunityId,
        creator: &UserId,
    ) -> MembershipResult<CreatedClub> {
        let club = Club {
            id: ClubId::generate(),
            name: name.to_string(),
            description: description.map(str::to_string),
            community_id: community_id.clone(),
            created_by: Some(creator.clone()),
            created_at: Timestamp::now(),
        };
        {
            let conn = self.store.conn()?;
            let result = conn.execute(
                "INSERT INTO clubs (id, name, description, community_id, created_by, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    club.id.as_str(),
                    &club.name,
                    club.description.as_deref(),
                    club.community_id.as_str(),
                    creator.as_str(),
                    club.created_at.as_millis() as i64,
                ],
            );
            if let Err(err) = result {
                let err: crate::core_store::StoreError = err.into();
                if err.is_missing_target() {
                    return Err(MembershipError::NotFound("community"));
                }
                return Err(err.into());
            }
        }
        tracing::info!(club_id = %club.id, name = %club.name, "club created");

        let creator_joined = match self.join_club(creator, &club.id).await {
            Ok(()) | Err(MembershipError::AlreadyMember) => {
                self.mark_creator_joined("clubs", club.id.as_str());
                true
            }
            Err(err) => {
                tracing::warn!(club_id = %club.id, user_id = %creator, error = %err,
                    "creator auto-join failed; club kept");
                false
            }
        };
        Ok(CreatedClub {
            club,
            creator_joined,
        })
    }

    /// Join a club. A duplicate membership maps to `AlreadyMember`.
    pub async fn join_club(&self, user_id: &UserId, club_id: &ClubId) -> MembershipResult<()> {
        let conn = self.store.conn()?;
        let result = conn.execute(
            "INSERT INTO club_memberships (user_id, club_id, joined_at) VALUES (?, ?, ?)",
            params![
                user_id.as_str(),
                club_id.as_str(),
                Timestamp::now().as_millis() as i64,
            ],
        );
        match result {
            Ok(_) => {
                tracing::debug!(user_id = %user_id, club_id = %club_id, "joined club");
                Ok(())
            }
            Err(err) => {
                let err: crate::core_store::StoreError = err.into();
                if err.is_duplicate_key() {
                    Err(MembershipError::AlreadyMember)
                } else if err.is_missing_target() {
                    Err(MembershipError::NotFound("club"))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Leave a club. Idempotent.
    pub async fn leave_club(&self, user_id: &UserId, club_id: &ClubId) -> MembershipResult<()> {
        self.delete_idempotent(
            "DELETE FROM club_memberships WHERE user_id = ? AND club_id = ?",
            &[user_id.as_str(), club_id.as_str()],
        )?;
        Ok(())
    }

    pub async fn is_club_member(
        &self,
        user_id: &UserId,
        club_id: &ClubId,
    ) -> MembershipResult<bool> {
        let conn = self.store.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM club_memberships WHERE user_id = ? AND club_id = ?",
                params![user_id.as_str(), club_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Clubs in a community, newest first.
    pub async fn list_clubs(&self, community_id: &CommunityId) -> MembershipResult<Vec<Club>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, community_id, created_by, created_at
             FROM clubs WHERE community_id = ? ORDER BY created_at DESC, id",
        )?;
        let clubs = stmt
            .query_map(params![community_id.as_str()], row_to_club)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clubs)
    }

    /// Clubs the user belongs to.
    pub async fn clubs_of(&self, user_id: &UserId) -> MembershipResult<Vec<Club>> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.description, c.community_id, c.created_by, c.created_at
             FROM clubs c JOIN club_memberships m ON m.club_id = c.id
             WHERE m.user_id = ? ORDER BY m.joined_at",
        )?;
        let clubs = stmt
            .query_map(params![user_id.as_str()], row_to_club)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clubs)
    }

    // ---- rooms ----

    /// Create a chat room and auto-join the creator (best-effort, like
    /// club creation).
    pub async fn create_room(&self, name: &str, creator: &UserId) -> MembershipResult<CreatedRoom> {
        let room = Room {
            id: RoomId::generate(),
            name: name.to_string(),
            created_by: Some(creator.clone()),
            created_at: Timestamp::now(),
        };
        {
            let conn = self.store.conn()?;
            conn.execute(
                "INSERT INTO rooms (id, name, created_by, created_at) VALUES (?, ?, ?, ?)",
                params![
                    room.id.as_str(),
                    &room.name,
                    creator.as_str(),
                    room.created_at.as_millis() as i64,
                ],
            )?;
        }
        tracing::info!(room_id = %room.id, name = %room.name, "room created");

        let creator_joined = match self.join_room(creator, &room.id).await {
            Ok(()) => {
                self.mark_creator_joined("rooms", room.id.as_str());
                true
            }
            Err(err) => {
                tracing::warn!(room_id = %room.id, user_id = %creator, error = %err,
                    "creator auto-join failed; room kept");
                false
            }
        };
        Ok(CreatedRoom {
            room,
            creator_joined,
        })
    }

    /// Join a room. Idempotent: joining a room you are already in is
    /// success, not an error.
    pub async fn join_room(&self, user_id: &UserId, room_id: &RoomId) -> MembershipResult<()> {
        let conn = self.store.conn()?;
        let result = conn.execute(
            "INSERT INTO room_memberships (user_id, room_id, joined_at) VALUES (?, ?, ?)",
            params![
                user_id.as_str(),
                room_id.as_str(),
                Timestamp::now().as_millis() as i64,
            ],
        );
        match result {
            Ok(_) => {
                tracing::debug!(user_id = %user_id, room_id = %room_id, "joined room");
                Ok(())
            }
            Err(err) => {
                let err: crate::core_store::StoreError = err.into();
                if err.is_duplicate_key() {
                    // Auto-join semantics: already in the room is fine.
                    Ok(())
                } else if err.is_missing_target() {
                    Err(MembershipError::NotFound("room"))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Leave a room. Idempotent.
    pub async fn leave_room(&self, user_id: &UserId, room_id: &RoomId) -> MembershipResult<()> {
        self.delete_idempotent(
            "DELETE FROM room_memberships WHERE user_id = ? AND room_id = ?",
            &[user_id.as_str(), room_id.as_str()],
        )?;
        Ok(())
    }

    pub async fn is_room_member(
        &self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> MembershipResult<bool> {
        let conn = self.store.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM room_memberships WHERE user_id = ? AND room_id = ?",
                params![user_id.as_str(), room_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Member count of a club or room.
    pub async fn member_count(&self, container: &ContainerId) -> MembershipResult<u64> {
        let conn = self.store.conn()?;
        let (sql, id) = match container {
            ContainerId::Club(club_id) => (
                "SELECT COUNT(*) FROM club_memberships WHERE club_id = ?",
                club_id.as_str(),
            ),
            ContainerId::Room(room_id) => (
                "SELECT COUNT(*) FROM room_memberships WHERE room_id = ?",
                room_id.as_str(),
            ),
        };
        let count: i64 = conn.query_row(sql, params![id], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ---- reconciliation ----

    /// Backfill creator memberships for clubs and rooms whose best-effort
    /// creator join never landed. Only rows still marked pending are
    /// touched; a creator who deliberately left is never re-joined.
    /// Returns the number of membership rows inserted.
    pub async fn reconcile_creator_memberships(&self) -> MembershipResult<u64> {
        let conn = self.store.conn()?;
        let now = Timestamp::now().as_millis() as i64;

        let tx = conn.unchecked_transaction().map_err(crate::core_store::StoreError::from)?;
        let clubs = tx.execute(
            "INSERT OR IGNORE INTO club_memberships (user_id, club_id, joined_at)
             SELECT created_by, id, ? FROM clubs
             WHERE created_by IS NOT NULL AND creator_joined = 0",
            params![now],
        )?;
        tx.execute(
            "UPDATE clubs SET creator_joined = 1
             WHERE created_by IS NOT NULL AND creator_joined = 0",
            [],
        )?;
        let rooms = tx.execute(
            "INSERT OR IGNORE INTO room_memberships (user_id, room_id, joined_at)
             SELECT created_by, id, ? FROM rooms
             WHERE created_by IS NOT NULL AND creator_joined = 0",
            params![now],
        )?;
        tx.execute(
            "UPDATE rooms SET creator_joined = 1
             WHERE created_by IS NOT NULL AND creator_joined = 0",
            [],
        )?;
        tx.commit().map_err(crate::core_store::StoreError::from)?;

        let backfilled = (clubs + rooms) as u64;
        if backfilled > 0 {
            tracing::info!(backfilled, "reconciled creator memberships");
        }
        Ok(backfilled)
    }

    /// Flip the pending-repair marker after a creator join landed. A
    /// failure here is harmless: reconciliation re-runs the idempotent
    /// join and sets the marker itself.
    fn mark_creator_joined(&self, table: &'static str, id: &str) {
        let marked = self.store.conn().map_err(MembershipError::from).and_then(|conn| {
            conn.execute(
                &format!("UPDATE {table} SET creator_joined = 1 WHERE id = ?"),
                params![id],
            )
            .map_err(MembershipError::from)
        });
        if let Err(err) = marked {
            tracing::warn!(table, id, error = %err, "could not mark creator join");
        }
    }

    /// Idempotent delete with one transparent retry on a transient store
    /// error. Safe to retry because re-deleting is a no-op.
    fn delete_idempotent(&self, sql: &str, args: &[&str]) -> StoreResult<()> {
        match self.try_delete(sql, args) {
            Err(err) if err.is_transient() => {
                tracing::debug!(error = %err, "transient store error on leave; retrying once");
                self.try_delete(sql, args)
            }
            other => other,
        }
    }

    fn try_delete(&self, sql: &str, args: &[&str]) -> StoreResult<()> {
        let conn = self.store.conn()?;
        conn.execute(sql, rusqlite::params_from_iter(args))?;
        Ok(())
    }
}

fn row_to_club(row: &Row<'_>) -> rusqlite::Result<Club> {
    Ok(Club {
        id: ClubId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        community_id: CommunityId::new(row.get::<_, String>(3)?),
        created_by: row.get::<_, Option<String>>(4)?.map(UserId::new),
        created_at: Timestamp::from_millis(row.get::<_, i64>(5)? as u64),
    })
}
