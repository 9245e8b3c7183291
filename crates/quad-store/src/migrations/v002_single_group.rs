//! v002 -- One active group per user.
//!
//! Backs the single-group invariant with a unique index so that two racing
//! "add to group" writes can never leave a user in two groups.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Keep only the most recent membership of any user that somehow holds several.
DELETE FROM group_members
WHERE rowid NOT IN (
    SELECT rowid FROM (
        SELECT rowid,
               ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY joined_at DESC, rowid DESC) AS rn
        FROM group_members
    )
    WHERE rn = 1
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_group_members_one_group
    ON group_members(user_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
