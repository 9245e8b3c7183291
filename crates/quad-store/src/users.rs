//! User directory: identity bookkeeping and profile reads/writes.
//!
//! Credentials are never checked here. Callers hand over claims that the
//! identity provider has already verified.

use quad_shared::UserId;
use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::database::{row_exists, Database};
use crate::error::{Result, StoreError};
use crate::models::{ProfileUpdate, User, UserSearch, VerifiedIdentity};
use crate::timestamp;

const USER_COLUMNS: &str =
    "id, username, email, profile_pic_url, dept, yr, status, last_online, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create / identity
    // ------------------------------------------------------------------

    /// Find the user owning `identity.email`, creating it on first sight.
    ///
    /// An existing user without a profile picture gets the one from the
    /// identity claims.
    pub fn upsert_verified_user(&self, identity: &VerifiedIdentity) -> Result<User> {
        let email = identity.email.trim();
        if email.is_empty() {
            return Err(StoreError::invalid("email is required"));
        }

        let existing = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?;

        match existing {
            Some(user) => {
                if user.profile_pic_url.as_deref().unwrap_or("").is_empty() {
                    if let Some(picture) = identity.picture.as_deref().filter(|p| !p.is_empty()) {
                        self.conn().execute(
                            "UPDATE users SET profile_pic_url = ?1 WHERE id = ?2",
                            params![picture, user.id.0],
                        )?;
                        tracing::debug!(user = %user.id, "backfilled profile picture");
                        return self.get_user(user.id);
                    }
                }
                Ok(user)
            }
            None => {
                let now = timestamp::now();
                self.conn().execute(
                    "INSERT INTO users (username, email, profile_pic_url, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        identity.name,
                        email,
                        identity.picture,
                        timestamp::encode(&now),
                    ],
                )?;
                let id = UserId(self.conn().last_insert_rowid());
                tracing::info!(user = %id, "registered user from verified identity");
                self.get_user(id)
            }
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("User not found"),
                other => StoreError::Sqlite(other),
            })
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        row_exists(self.conn(), "SELECT 1 FROM users WHERE id = ?1", params![id.0])
    }

    /// Fail with `NotFound` unless every listed user exists.
    pub(crate) fn require_users(&self, ids: &[UserId]) -> Result<()> {
        for id in ids {
            if !self.user_exists(*id)? {
                return Err(StoreError::not_found(format!("User {id} does not exist")));
            }
        }
        Ok(())
    }

    pub fn search_users(&self, filter: &UserSearch) -> Result<Vec<User>> {
        let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
        let mut values: Vec<String> = Vec::new();

        if let Some(username) = filter.username.as_deref().filter(|s| !s.is_empty()) {
            values.push(format!("%{}%", escape_like(username)));
            sql.push_str(&format!(" AND username LIKE ?{} ESCAPE '\\'", values.len()));
        }
        for (col, value) in [
            ("dept", &filter.dept),
            ("yr", &filter.yr),
            ("status", &filter.status),
        ] {
            if let Some(v) = value.as_deref().filter(|s| !s.is_empty()) {
                values.push(v.to_string());
                sql.push_str(&format!(" AND {col} = ?{}", values.len()));
            }
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<()> {
        let fields = update.provided();
        if fields.is_empty() {
            return Err(StoreError::invalid(
                "At least one field must be provided for update",
            ));
        }

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            fields.len() + 1
        );

        let mut values: Vec<rusqlite::types::Value> = fields
            .iter()
            .map(|(_, v)| rusqlite::types::Value::Text(v.to_string()))
            .collect();
        values.push(rusqlite::types::Value::Integer(id.0));

        let affected = self.conn().execute(&sql, params_from_iter(values))?;
        if affected == 0 {
            return Err(StoreError::not_found("User not found"));
        }

        tracing::info!(user = %id, fields = fields.len(), "profile updated");
        Ok(())
    }

    /// Stamp `last_online` with the current time.
    pub fn record_activity(&self, id: UserId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET last_online = ?1 WHERE id = ?2",
            params![timestamp::encode(&timestamp::now()), id.0],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found("User not found"));
        }
        tracing::debug!(user = %id, "recorded activity");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        profile_pic_url: row.get(3)?,
        dept: row.get(4)?,
        yr: row.get(5)?,
        status: row.get(6)?,
        last_online: timestamp::optional_column(row, 7)?,
        created_at: timestamp::column(row, 8)?,
    })
}

/// Escape `%`, `_` and `\` so `raw` matches literally inside a `LIKE`
/// pattern using `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Test helper shared by the other modules' tests.
#[cfg(test)]
pub(crate) fn seed_user(db: &Database, name: &str) -> UserId {
    db.upsert_verified_user(&VerifiedIdentity {
        email: format!("{name}@campus.test"),
        name: name.to_string(),
        picture: None,
    })
    .unwrap()
    .id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str, picture: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            email: email.to_string(),
            name: "Asha".to_string(),
            picture: picture.map(str::to_string),
        }
    }

    #[test]
    fn test_upsert_creates_then_reuses() {
        let db = Database::open_in_memory().unwrap();
        let first = db.upsert_verified_user(&identity("asha@campus.test", None)).unwrap();
        let second = db.upsert_verified_user(&identity("asha@campus.test", None)).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.id.is_valid());
    }

    #[test]
    fn test_upsert_backfills_missing_picture() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_verified_user(&identity("asha@campus.test", None)).unwrap();
        let user = db
            .upsert_verified_user(&identity("asha@campus.test", Some("https://pics/a.png")))
            .unwrap();
        assert_eq!(user.profile_pic_url.as_deref(), Some("https://pics/a.png"));

        // An existing picture is never overwritten.
        let user = db
            .upsert_verified_user(&identity("asha@campus.test", Some("https://pics/b.png")))
            .unwrap();
        assert_eq!(user.profile_pic_url.as_deref(), Some("https://pics/a.png"));
    }

    #[test]
    fn test_get_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId(99)), Err(StoreError::NotFound(_))));
        assert!(!db.user_exists(UserId(99)).unwrap());
    }

    #[test]
    fn test_update_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "ravi");

        let update = ProfileUpdate {
            dept: Some("CSE".into()),
            yr: Some("3".into()),
            ..Default::default()
        };
        db.update_profile(id, &update).unwrap();

        let user = db.get_user(id).unwrap();
        assert_eq!(user.dept.as_deref(), Some("CSE"));
        assert_eq!(user.yr.as_deref(), Some("3"));
        assert_eq!(user.username, "ravi");
    }

    #[test]
    fn test_update_profile_rejects_empty_and_unknown() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "ravi");
        assert!(matches!(
            db.update_profile(id, &ProfileUpdate::default()),
            Err(StoreError::Invalid(_))
        ));

        let update = ProfileUpdate {
            status: Some("busy".into()),
            ..Default::default()
        };
        assert!(matches!(
            db.update_profile(UserId(404), &update),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_search_filters_combine() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "meera");
        let b = seed_user(&db, "meenakshi");
        seed_user(&db, "arjun");
        for id in [a, b] {
            db.update_profile(
                id,
                &ProfileUpdate {
                    dept: Some(if id == a { "ECE" } else { "CSE" }.into()),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let by_name = db
            .search_users(&UserSearch {
                username: Some("mee".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 2);

        let narrowed = db
            .search_users(&UserSearch {
                username: Some("mee".into()),
                dept: Some("CSE".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, b);

        assert_eq!(db.search_users(&UserSearch::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let db = Database::open_in_memory().unwrap();
        let underscored = seed_user(&db, "a_b");
        seed_user(&db, "axb");
        let percent = seed_user(&db, "100%");
        seed_user(&db, "1000");

        let search = |name: &str| -> Vec<UserId> {
            db.search_users(&UserSearch {
                username: Some(name.into()),
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect()
        };
        assert_eq!(search("_"), vec![underscored]);
        assert_eq!(search("%"), vec![percent]);
        assert!(search("\\").is_empty());
    }

    #[test]
    fn test_record_activity() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "ravi");
        assert!(db.get_user(id).unwrap().last_online.is_none());
        db.record_activity(id).unwrap();
        assert!(db.get_user(id).unwrap().last_online.is_some());
        assert!(matches!(
            db.record_activity(UserId(77)),
            Err(StoreError::NotFound(_))
        ));
    }
}
