//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `users`, `friends`, `groups`,
//! `group_members` and `user_status`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (written by the identity collaborator, read-mostly here)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    username        TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    profile_pic_url TEXT,
    dept            TEXT,
    yr              TEXT,
    status          TEXT,
    last_online     TEXT,                        -- ISO-8601 / RFC-3339
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

-- ----------------------------------------------------------------
-- Relationship edges, one row per ordered pair
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    user_id   INTEGER NOT NULL,
    friend_id INTEGER NOT NULL,
    status    TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'blocked')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    CHECK (user_id <> friend_id),
    FOREIGN KEY (user_id)   REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (friend_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_friends_friend ON friends(friend_id, status);

-- ----------------------------------------------------------------
-- Groups ("groups" is quoted: GROUPS is a keyword since SQLite 3.28)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS "groups" (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name    TEXT NOT NULL,
    group_pic_url TEXT,
    created_by    INTEGER NOT NULL,
    created_at    TEXT NOT NULL,

    FOREIGN KEY (created_by) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Group memberships
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_members (
    group_id  INTEGER NOT NULL,
    user_id   INTEGER NOT NULL,
    role      TEXT NOT NULL CHECK (role IN ('admin', 'co-admin', 'member', 'guest')),
    joined_at TEXT NOT NULL,

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES "groups"(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id)  REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_group_members_joined
    ON group_members(group_id, joined_at);

-- ----------------------------------------------------------------
-- Presence (soft state, one row per user, never deleted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_status (
    user_id        INTEGER PRIMARY KEY NOT NULL,
    is_online      INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    last_active_at TEXT,
    status_message TEXT NOT NULL DEFAULT '',
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_status_online ON user_status(is_online);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
