//! Content row storage.
//!
//! Inserts are single statements, so a publish cancelled mid-call never
//! leaves a half-written row. Range queries follow the canonical
//! `(created_at, id)` order that every subscriber shares.

use rusqlite::{params, OptionalExtension, Row};

use crate::core_store::model::{
    ContainerId, ContentId, ContentItem, ContentKey, ModerationStatus, Timestamp, UserId,
};
use crate::core_store::{Store, StoreResult};

/// SQL-backed content store. Cheap to clone.
#[derive(Clone)]
pub struct ContentStore {
    store: Store,
}

impl ContentStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert a content row and return its assigned timestamp.
    ///
    /// The stored `created_at` is the requested time clamped strictly
    /// above the container's current maximum. SQLite serializes writers,
    /// so the clamp makes ordering keys increase in commit order: a row
    /// committing after another can never sort before it, and a live
    /// cursor never has to look behind itself. One statement; commits
    /// atomically.
    pub fn insert(&self, item: &ContentItem) -> StoreResult<Timestamp> {
        let conn = self.store.conn()?;
        let assigned: i64 = conn.query_row(
            "INSERT INTO content_items
             (id, container_kind, container_id, author_id, body, status, moderation_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                     MAX(?8, COALESCE((SELECT MAX(created_at) + 1 FROM content_items
                                       WHERE container_id = ?3), 0)))
             RETURNING created_at",
            params![
                item.id.as_str(),
                item.container.kind(),
                item.container.as_str(),
                item.author.as_str(),
                &item.body,
                item.status.as_str(),
                item.moderation_reason.as_deref(),
                item.created_at.as_millis() as i64,
            ],
            |row| row.get(0),
        )?;
        Ok(Timestamp::from_millis(assigned as u64))
    }

    /// Fetch a content item by id.
    pub fn get(&self, id: &ContentId) -> StoreResult<Option<ContentItem>> {
        let conn = self.store.conn()?;
        let item = conn
            .query_row(
                &format!("{SELECT_ITEM} WHERE id = ?"),
                params![id.as_str()],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// All items in a container with key strictly greater than `after`,
    /// in canonical order. `None` starts from the beginning.
    pub fn fetch_since(
        &self,
        container: &ContainerId,
        after: Option<&ContentKey>,
    ) -> StoreResult<Vec<ContentItem>> {
        let conn = self.store.conn()?;
        let items = match after {
            Some(key) => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_ITEM}
                     WHERE container_id = ?
                       AND (created_at > ? OR (created_at = ? AND id > ?))
                     ORDER BY created_at, id"
                ))?;
                let millis = key.created_at.as_millis() as i64;
                let rows = stmt
                    .query_map(
                        params![container.as_str(), millis, millis, key.id.as_str()],
                        row_to_item,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_ITEM} WHERE container_id = ? ORDER BY created_at, id"
                ))?;
                let rows = stmt
                    .query_map(params![container.as_str()], row_to_item)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(items)
    }

    /// Items of a container as `viewer` is allowed to see them: flagged
    /// items only for their author, unless the viewer is an admin.
    pub fn visible_items_for(
        &self,
        container: &ContainerId,
        viewer: &UserId,
        viewer_is_admin: bool,
    ) -> StoreResult<Vec<ContentItem>> {
        let items = self.fetch_since(container, None)?;
        Ok(items
            .into_iter()
            .filter(|item| {
                item.status != ModerationStatus::Flagged
                    || viewer_is_admin
                    || item.author == *viewer
            })
            .collect())
    }

    /// Whether the container row exists in its table.
    pub fn container_exists(&self, container: &ContainerId) -> StoreResult<bool> {
        let conn = self.store.conn()?;
        let (sql, id) = match container {
            ContainerId::Club(club_id) => ("SELECT 1 FROM clubs WHERE id = ?", club_id.as_str()),
            ContainerId::Room(room_id) => ("SELECT 1 FROM rooms WHERE id = ?", room_id.as_str()),
        };
        let exists: Option<i64> = conn.query_row(sql, params![id], |row| row.get(0)).optional()?;
        Ok(exists.is_some())
    }
}

const SELECT_ITEM: &str = "SELECT id, container_kind, container_id, author_id, body, status, \
                           moderation_reason, created_at FROM content_items";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    let kind: String = row.get(1)?;
    let container_id: String = row.get(2)?;
    let container = ContainerId::from_parts(&kind, container_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown container kind: {kind}").into(),
        )
    })?;
    let status: String = row.get(5)?;
    Ok(ContentItem {
        id: ContentId::new(row.get::<_, String>(0)?),
        container,
        author: UserId::new(row.get::<_, String>(3)?),
        body: row.get(4)?,
        status: ModerationStatus::from_str(&status).unwrap_or(ModerationStatus::Pending),
        moderation_reason: row.get(6)?,
        created_at: Timestamp::from_millis(row.get::<_, i64>(7)? as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::ClubId;

    fn item(id: &str, container: &ContainerId, author: &str, millis: u64) -> ContentItem {
        ContentItem {
            id: ContentId::new(id),
            container: container.clone(),
            author: UserId::new(author),
            body: format!("body of {id}"),
            status: ModerationStatus::Approved,
            moderation_reason: None,
            created_at: Timestamp::from_millis(millis),
        }
    }

    fn club_container(store: &Store, id: &str) -> ContainerId {
        let conn = store.conn().unwrap();
        conn.execute(
            "INSERT INTO communities (id, name, college_name, created_at) VALUES ('comm', 'C', 'College', 0)
             ON CONFLICT DO NOTHING",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO clubs (id, name, community_id, created_at) VALUES (?, 'Club', 'comm', 0)",
            params![id],
        )
        .unwrap();
        ContainerId::Club(ClubId::new(id))
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        let original = item("i1", &container, "u1", 100);
        content.insert(&original).unwrap();

        assert_eq!(content.get(&ContentId::new("i1")).unwrap(), Some(original));
        assert_eq!(content.get(&ContentId::new("i2")).unwrap(), None);
    }

    #[test]
    fn test_insert_assigns_strictly_increasing_keys() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        // Requested timestamps arrive out of order; the clamp keeps
        // assigned keys increasing in commit order.
        let b = content.insert(&item("b", &container, "u1", 200)).unwrap();
        let a = content.insert(&item("a", &container, "u1", 100)).unwrap();
        let c = content.insert(&item("c", &container, "u1", 300)).unwrap();

        assert_eq!(b, Timestamp::from_millis(200));
        assert_eq!(a, Timestamp::from_millis(201));
        assert_eq!(c, Timestamp::from_millis(300));

        let ids: Vec<_> = content
            .fetch_since(&container, None)
            .unwrap()
            .into_iter()
            .map(|i| i.id.0)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_insert_clamps_same_millisecond_above_existing_row() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        // A lexicographically smaller id committing second must not sort
        // below the row already committed at the same millisecond.
        let first = content.insert(&item("zzz", &container, "u1", 100)).unwrap();
        let second = content.insert(&item("aaa", &container, "u2", 100)).unwrap();
        assert!(second > first);

        let ids: Vec<_> = content
            .fetch_since(&container, None)
            .unwrap()
            .into_iter()
            .map(|i| i.id.0)
            .collect();
        assert_eq!(ids, vec!["zzz", "aaa"]);
    }

    #[test]
    fn test_fetch_since_is_strictly_after() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        content.insert(&item("a", &container, "u1", 100)).unwrap();
        content.insert(&item("b", &container, "u1", 100)).unwrap();
        content.insert(&item("c", &container, "u1", 200)).unwrap();

        let after = ContentKey {
            created_at: Timestamp::from_millis(100),
            id: ContentId::new("a"),
        };
        let ids: Vec<_> = content
            .fetch_since(&container, Some(&after))
            .unwrap()
            .into_iter()
            .map(|i| i.id.0)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_visible_items_hide_flagged_from_non_authors() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        content.insert(&item("a", &container, "u1", 100)).unwrap();
        let mut flagged = item("b", &container, "u1", 200);
        flagged.status = ModerationStatus::Flagged;
        flagged.moderation_reason = Some("spam".to_string());
        content.insert(&flagged).unwrap();

        let for_author = content
            .visible_items_for(&container, &UserId::new("u1"), false)
            .unwrap();
        assert_eq!(for_author.len(), 2);

        let for_other = content
            .visible_items_for(&container, &UserId::new("u2"), false)
            .unwrap();
        assert_eq!(for_other.len(), 1);
        assert_eq!(for_other[0].id, ContentId::new("a"));

        let for_admin = content
            .visible_items_for(&container, &UserId::new("u2"), true)
            .unwrap();
        assert_eq!(for_admin.len(), 2);
    }

    #[test]
    fn test_container_exists() {
        let store = Store::memory().unwrap();
        let content = ContentStore::new(store.clone());
        let container = club_container(&store, "club-1");

        assert!(content.container_exists(&container).unwrap());
        assert!(!content
            .container_exists(&ContainerId::Club(ClubId::new("ghost")))
            .unwrap());
    }
}
