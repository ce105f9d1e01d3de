//! Database migrations for the coordinator schema
//!
//! Provides versioned migrations, applied atomically and tracked in the
//! schema_version table. The uniqueness rules declared here are the
//! serialization points for the membership and audit invariants: the
//! single-community constraint is the `user_id` primary key on
//! `community_memberships`, and at-most-one audit row per item is the
//! `content_id` primary key on `moderation_log`.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial coordinator schema",
        up_sql: r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            -- Profiles, created lazily on first session
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('admin', 'mentor', 'junior')),
                mentorship_available INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            -- Top-level college communities
            CREATE TABLE IF NOT EXISTS communities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                college_name TEXT NOT NULL,
                created_by TEXT,
                created_at INTEGER NOT NULL
            );

            -- At most one community per user: user_id is the primary key,
            -- so a second concurrent join loses at the insert.
            CREATE TABLE IF NOT EXISTS community_memberships (
                user_id TEXT PRIMARY KEY,
                community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
                joined_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_community_members_community
                ON community_memberships(community_id);

            -- Clubs within a community. creator_joined tracks the
            -- best-effort creator auto-join: 0 until the join lands, so
            -- reconciliation repairs exactly the clubs that still owe one
            -- and never re-joins a creator who later left.
            CREATE TABLE IF NOT EXISTS clubs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
                created_by TEXT,
                creator_joined INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clubs_community ON clubs(community_id);

            -- Unlimited club memberships per user, unique per (user, club)
            CREATE TABLE IF NOT EXISTS club_memberships (
                user_id TEXT NOT NULL,
                club_id TEXT NOT NULL REFERENCES clubs(id) ON DELETE CASCADE,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, club_id)
            );

            CREATE INDEX IF NOT EXISTS idx_club_members_club ON club_memberships(club_id);

            -- Direct-mentorship chat rooms; creator_joined as for clubs
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT,
                creator_joined INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            -- Room membership is auto-join and idempotent
            CREATE TABLE IF NOT EXISTS room_memberships (
                user_id TEXT NOT NULL,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, room_id)
            );

            CREATE INDEX IF NOT EXISTS idx_room_members_room ON room_memberships(room_id);

            -- Content: club posts and chat messages, append-only.
            -- (container_id, created_at, id) is the canonical order.
            CREATE TABLE IF NOT EXISTS content_items (
                id TEXT PRIMARY KEY,
                container_kind TEXT NOT NULL CHECK(container_kind IN ('club', 'room')),
                container_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('approved', 'flagged', 'pending')),
                moderation_reason TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_content_order
                ON content_items(container_id, created_at, id);

            -- Immutable moderation audit, at most one row per item
            CREATE TABLE IF NOT EXISTS moderation_log (
                content_id TEXT PRIMARY KEY REFERENCES content_items(id) ON DELETE CASCADE,
                flagged INTEGER NOT NULL,
                reason TEXT,
                confidence REAL,
                resolved_at INTEGER NOT NULL
            );
        "#,
    }]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Result<i32, _> = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), rusqlite::Error> {
    let current_version = get_current_version(pool)?;
    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get().map_err(|e| {
        rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to get connection: {}", e),
        )))
    })?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
