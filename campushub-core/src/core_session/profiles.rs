//! Profile storage: the `users` table.
//!
//! Profiles are read-mostly. Creation happens lazily on the first
//! successful session for a subject; role elevation happens only through
//! the admin gate.

use super::session::{Profile, Role};
use crate::core_store::{Store, StoreResult, Timestamp, UserId};
use rusqlite::{params, OptionalExtension};

/// SQL-backed profile store.
#[derive(Clone)]
pub struct ProfileStore {
    store: Store,
}

impl ProfileStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Fetch a profile by user id.
    pub fn get(&self, user_id: &UserId) -> StoreResult<Option<Profile>> {
        let conn = self.store.conn()?;
        let profile = conn
            .query_row(
                "SELECT id, name, role, mentorship_available FROM users WHERE id = ?",
                params![user_id.as_str()],
                |row| {
                    let role_str: String = row.get(2)?;
                    Ok(Profile {
                        id: UserId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        role: Role::from_str(&role_str).unwrap_or(Role::Junior),
                        mentorship_available: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Create the profile row if absent, then return the stored profile.
    ///
    /// A concurrent create for the same subject is resolved by the primary
    /// key; whichever insert lands first wins and the other reads it back.
    pub fn create_if_absent(&self, profile: &Profile) -> StoreResult<Profile> {
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (id, name, role, mentorship_available, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                profile.id.as_str(),
                &profile.name,
                profile.role.as_str(),
                profile.mentorship_available as i64,
                Timestamp::now().as_millis() as i64,
            ],
        )?;
        drop(conn);
        // Read back whatever won.
        Ok(self.get(&profile.id)?.unwrap_or_else(|| profile.clone()))
    }

    /// Elevate an existing account to the admin role.
    pub fn elevate_to_admin(&self, user_id: &UserId) -> StoreResult<()> {
        let conn = self.store.conn()?;
        conn.execute(
            "UPDATE users SET role = 'admin' WHERE id = ?",
            params![user_id.as_str()],
        )?;
        Ok(())
    }
}
