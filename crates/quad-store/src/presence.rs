//! Presence registry: one soft-state liveness row per user.
//!
//! Every write is a single `INSERT ... ON CONFLICT DO UPDATE`, so concurrent
//! signals for the same user resolve as last-write-wins.

use quad_shared::UserId;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PresenceRecord;
use crate::timestamp;

const STATUS_COLUMNS: &str = "user_id, is_online, last_active_at, status_message, updated_at";

impl Database {
    pub fn set_online(&self, user: UserId) -> Result<PresenceRecord> {
        ensure_valid(user)?;
        let now = timestamp::encode(&timestamp::now());
        self.conn().execute(
            "INSERT INTO user_status (user_id, is_online, last_active_at, updated_at)
             VALUES (?1, 1, ?2, ?2)
             ON CONFLICT (user_id) DO UPDATE SET
                 is_online      = 1,
                 last_active_at = excluded.last_active_at,
                 updated_at     = excluded.updated_at",
            params![user.0, now],
        )?;
        tracing::debug!(user = %user, "presence online");
        self.get_status(user)
    }

    pub fn set_offline(&self, user: UserId) -> Result<PresenceRecord> {
        ensure_valid(user)?;
        let now = timestamp::encode(&timestamp::now());
        self.conn().execute(
            "INSERT INTO user_status (user_id, is_online, updated_at)
             VALUES (?1, 0, ?2)
             ON CONFLICT (user_id) DO UPDATE SET
                 is_online  = 0,
                 updated_at = excluded.updated_at",
            params![user.0, now],
        )?;
        tracing::debug!(user = %user, "presence offline");
        self.get_status(user)
    }

    /// Heartbeat: refresh the activity timestamps, leave `is_online` alone.
    pub fn touch_activity(&self, user: UserId) -> Result<PresenceRecord> {
        ensure_valid(user)?;
        let now = timestamp::encode(&timestamp::now());
        self.conn().execute(
            "INSERT INTO user_status (user_id, last_active_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT (user_id) DO UPDATE SET
                 last_active_at = excluded.last_active_at,
                 updated_at     = excluded.updated_at",
            params![user.0, now],
        )?;
        tracing::trace!(user = %user, "presence heartbeat");
        self.get_status(user)
    }

    pub fn set_status_message(&self, user: UserId, message: &str) -> Result<PresenceRecord> {
        ensure_valid(user)?;
        let now = timestamp::encode(&timestamp::now());
        self.conn().execute(
            "INSERT INTO user_status (user_id, status_message, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                 status_message = excluded.status_message,
                 updated_at     = excluded.updated_at",
            params![user.0, message, now],
        )?;
        tracing::info!(user = %user, "status message updated");
        self.get_status(user)
    }

    /// The user's record, or the offline/never-seen default when there is none.
    pub fn get_status(&self, user: UserId) -> Result<PresenceRecord> {
        ensure_valid(user)?;
        let record = self
            .conn()
            .query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM user_status WHERE user_id = ?1"),
                params![user.0],
                row_to_record,
            )
            .optional()?;
        Ok(record.unwrap_or_else(|| PresenceRecord::unseen(user)))
    }

    pub fn list_online(&self) -> Result<Vec<PresenceRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM user_status WHERE is_online = 1 ORDER BY user_id ASC"
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn ensure_valid(user: UserId) -> Result<()> {
    if user.is_valid() {
        Ok(())
    } else {
        Err(StoreError::invalid(format!("Invalid user id {user}")))
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresenceRecord> {
    Ok(PresenceRecord {
        user_id: UserId(row.get(0)?),
        is_online: row.get::<_, i64>(1)? != 0,
        last_active_at: timestamp::optional_column(row, 2)?,
        status_message: row.get(3)?,
        updated_at: timestamp::optional_column(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pause() {
        std::thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn test_online_offline_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let five = UserId(5);

        let record = db.set_online(five).unwrap();
        assert!(record.is_online);
        assert!(record.last_active_at.is_some());
        assert!(db.get_status(five).unwrap().is_online);

        db.set_offline(five).unwrap();
        let record = db.get_status(five).unwrap();
        assert!(!record.is_online);
        // Going offline keeps the last activity time.
        assert!(record.last_active_at.is_some());
    }

    #[test]
    fn test_touch_activity_keeps_online_flag() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId(5);
        let before = db.set_offline(user).unwrap();

        pause();
        let after = db.touch_activity(user).unwrap();
        assert!(!after.is_online);
        assert!(after.last_active_at.is_some());
        assert!(after.updated_at > before.updated_at);

        db.set_online(user).unwrap();
        pause();
        let later = db.touch_activity(user).unwrap();
        assert!(later.is_online);
        assert!(later.last_active_at > after.last_active_at);
    }

    #[test]
    fn test_unknown_user_reads_default() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_status(UserId(42)).unwrap(), PresenceRecord::unseen(UserId(42)));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.set_online(UserId(0)), Err(StoreError::Invalid(_))));
        assert!(matches!(db.get_status(UserId(-3)), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_list_online_tracks_latest_state() {
        let db = Database::open_in_memory().unwrap();
        db.set_online(UserId(5)).unwrap();
        db.set_online(UserId(6)).unwrap();
        db.set_offline(UserId(5)).unwrap();

        let online: Vec<_> = db.list_online().unwrap().into_iter().map(|r| r.user_id).collect();
        assert_eq!(online, vec![UserId(6)]);
    }

    #[test]
    fn test_status_message_preserves_online_flag() {
        let db = Database::open_in_memory().unwrap();
        db.set_online(UserId(8)).unwrap();
        let record = db.set_status_message(UserId(8), "in the library").unwrap();
        assert!(record.is_online);
        assert_eq!(record.status_message, "in the library");

        let fresh = db.set_status_message(UserId(9), "").unwrap();
        assert!(!fresh.is_online);
        assert!(fresh.last_active_at.is_none());
    }
}
