//! Whether two users may contact each other.

use quad_shared::UserId;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// True iff an `accepted` edge exists between `a` and `b` in either
    /// direction and no `blocked` edge exists in either direction.
    ///
    /// A block always wins, even when an accepted edge sits next to it.
    pub fn can_communicate(&self, a: UserId, b: UserId) -> Result<bool> {
        if a == b {
            return Ok(false);
        }

        let (accepted, blocked): (i64, i64) = self.conn().query_row(
            "SELECT
                 COALESCE(SUM(status = 'accepted'), 0),
                 COALESCE(SUM(status = 'blocked'), 0)
             FROM friends
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            params![a.0, b.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let allowed = accepted > 0 && blocked == 0;
        tracing::debug!(a = %a, b = %b, allowed, "chat gate evaluated");
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::seed_user;

    fn friends() -> (Database, UserId, UserId) {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "asha");
        let b = seed_user(&db, "bilal");
        db.send_friend_request(a, b).unwrap();
        db.accept_friend_request(b, a).unwrap();
        (db, a, b)
    }

    #[test]
    fn test_strangers_cannot_chat() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "asha");
        let b = seed_user(&db, "bilal");
        assert!(!db.can_communicate(a, b).unwrap());
    }

    #[test]
    fn test_pending_is_not_enough() {
        let mut db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "asha");
        let b = seed_user(&db, "bilal");
        db.send_friend_request(a, b).unwrap();
        assert!(!db.can_communicate(a, b).unwrap());
    }

    #[test]
    fn test_friends_can_chat_both_ways() {
        let (db, a, b) = friends();
        assert!(db.can_communicate(a, b).unwrap());
        assert!(db.can_communicate(b, a).unwrap());
    }

    #[test]
    fn test_block_in_either_direction_wins() {
        let (mut db, a, b) = friends();
        db.set_block(a, b, true).unwrap();
        // b -> a is still accepted, the block on a -> b must win anyway.
        assert!(!db.can_communicate(a, b).unwrap());
        assert!(!db.can_communicate(b, a).unwrap());

        db.set_block(a, b, false).unwrap();
        // Unblocking deletes the edge; the remaining accepted edge suffices.
        assert!(db.can_communicate(a, b).unwrap());
    }

    #[test]
    fn test_requester_blocks_after_acceptance() {
        let mut db = Database::open_in_memory().unwrap();
        let ten = seed_user(&db, "ten");
        let twenty = seed_user(&db, "twenty");
        db.send_friend_request(ten, twenty).unwrap();
        db.accept_friend_request(twenty, ten).unwrap();
        db.set_block(ten, twenty, true).unwrap();
        assert!(!db.can_communicate(ten, twenty).unwrap());
    }
}
