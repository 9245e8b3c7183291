//! Relationship graph: friend requests, friendships and blocks.
//!
//! Edges are directed rows `(user_id -> friend_id, status)`. A friendship is
//! two `accepted` rows, and the only code path that creates the second row
//! is [`Database::accept_friend_request`], which writes both inside one
//! transaction. Blocks are one-directional and never touch the reverse row.

use quad_shared::{RelationStatus, UserId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{row_exists, Database};
use crate::error::{Result, StoreError};
use crate::models::{FriendSummary, IncomingRequest, RelationshipEdge};
use crate::timestamp;

impl Database {
    /// Create a `pending` edge `requester -> target`.
    ///
    /// Any existing edge between the pair, in either direction and with any
    /// status, is a conflict. That includes a block by the target, which is
    /// deliberately indistinguishable from the other cases.
    pub fn send_friend_request(
        &mut self,
        requester: UserId,
        target: UserId,
    ) -> Result<RelationshipEdge> {
        if requester == target {
            return Err(StoreError::invalid("You cannot send a request to yourself."));
        }
        self.require_pair(requester, target)?;

        let now = timestamp::encode(&timestamp::now());
        let tx = self.write_txn()?;

        if any_edge_between(&tx, requester, target)? {
            return Err(StoreError::conflict(
                "Friend request or friendship already exists.",
            ));
        }

        tx.execute(
            "INSERT INTO friends (user_id, friend_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
            params![requester.0, target.0, now],
        )?;
        tx.commit()?;

        tracing::info!(from = %requester, to = %target, "friend request sent");

        Ok(RelationshipEdge {
            user_id: requester,
            friend_id: target,
            status: RelationStatus::Pending,
        })
    }

    /// Accept the pending request `requester -> accepter` and bring the
    /// reciprocal edge `accepter -> requester` to `accepted` in the same
    /// transaction.
    pub fn accept_friend_request(&mut self, accepter: UserId, requester: UserId) -> Result<()> {
        if accepter == requester {
            return Err(StoreError::invalid("Invalid operation."));
        }

        let now = timestamp::encode(&timestamp::now());
        let tx = self.write_txn()?;

        let updated = tx.execute(
            "UPDATE friends SET status = 'accepted', updated_at = ?3
             WHERE user_id = ?1 AND friend_id = ?2 AND status = 'pending'",
            params![requester.0, accepter.0, now],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("No pending friend request found."));
        }

        tx.execute(
            "INSERT INTO friends (user_id, friend_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'accepted', ?3, ?3)
             ON CONFLICT (user_id, friend_id)
             DO UPDATE SET status = 'accepted', updated_at = excluded.updated_at",
            params![accepter.0, requester.0, now],
        )?;
        tx.commit()?;

        tracing::info!(accepter = %accepter, requester = %requester, "friend request accepted");
        Ok(())
    }

    /// Block or unblock `target` on behalf of `actor`.
    ///
    /// Blocking overwrites whatever `actor -> target` held before. Unblocking
    /// deletes that edge only if it is a block. Returns whether a row changed.
    pub fn set_block(&mut self, actor: UserId, target: UserId, blocked: bool) -> Result<bool> {
        if actor == target {
            return Err(StoreError::invalid("You cannot block yourself."));
        }
        self.require_pair(actor, target)?;

        let changed = if blocked {
            let now = timestamp::encode(&timestamp::now());
            self.conn().execute(
                "INSERT INTO friends (user_id, friend_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'blocked', ?3, ?3)
                 ON CONFLICT (user_id, friend_id)
                 DO UPDATE SET status = 'blocked', updated_at = excluded.updated_at",
                params![actor.0, target.0, now],
            )?
        } else {
            self.conn().execute(
                "DELETE FROM friends
                 WHERE user_id = ?1 AND friend_id = ?2 AND status = 'blocked'",
                params![actor.0, target.0],
            )?
        };

        tracing::info!(
            actor = %actor,
            target = %target,
            blocked,
            changed = changed > 0,
            "block state updated"
        );
        Ok(changed > 0)
    }

    /// The directed edge `from -> to`, if any.
    pub fn get_edge(&self, from: UserId, to: UserId) -> Result<Option<RelationshipEdge>> {
        let edge = self
            .conn()
            .query_row(
                "SELECT status FROM friends WHERE user_id = ?1 AND friend_id = ?2",
                params![from.0, to.0],
                |row| {
                    Ok(RelationshipEdge {
                        user_id: from,
                        friend_id: to,
                        status: status_column(row, 0)?,
                    })
                },
            )
            .optional()?;
        Ok(edge)
    }

    /// Accepted counterparties of `user`, read from either storage direction.
    ///
    /// Counterparties with a block in either direction are left out.
    pub fn list_friends(&self, user: UserId) -> Result<Vec<FriendSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT u.id, u.username, u.profile_pic_url
             FROM friends f
             JOIN users u
               ON u.id = CASE WHEN f.user_id = ?1 THEN f.friend_id ELSE f.user_id END
             WHERE (f.user_id = ?1 OR f.friend_id = ?1)
               AND f.status = 'accepted'
               AND NOT EXISTS (
                   SELECT 1 FROM friends b
                   WHERE b.status = 'blocked'
                     AND ((b.user_id = ?1 AND b.friend_id = u.id)
                       OR (b.user_id = u.id AND b.friend_id = ?1))
               )
             ORDER BY u.username ASC, u.id ASC",
        )?;

        let rows = stmt.query_map(params![user.0], row_to_summary)?;

        let mut friends = Vec::new();
        for row in rows {
            friends.push(row?);
        }
        Ok(friends)
    }

    /// Pending requests addressed to `user`, newest first.
    pub fn list_incoming_requests(&self, user: UserId) -> Result<Vec<IncomingRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.username, u.profile_pic_url, f.created_at
             FROM friends f
             JOIN users u ON u.id = f.user_id
             WHERE f.friend_id = ?1 AND f.status = 'pending'
             ORDER BY f.created_at DESC",
        )?;

        let rows = stmt.query_map(params![user.0], |row| {
            Ok(IncomingRequest {
                requester: row_to_summary(row)?,
                requested_at: timestamp::column(row, 3)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    fn require_pair(&self, a: UserId, b: UserId) -> Result<()> {
        if self.user_exists(a)? && self.user_exists(b)? {
            Ok(())
        } else {
            Err(StoreError::not_found("One or both users do not exist."))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn any_edge_between(conn: &Connection, a: UserId, b: UserId) -> Result<bool> {
    row_exists(
        conn,
        "SELECT 1 FROM friends
         WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
        params![a.0, b.0],
    )
}

fn status_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<RelationStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendSummary> {
    Ok(FriendSummary {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        profile_pic_url: row.get(2)?,
    })
}
