//! Group membership with the single-group invariant and role-gated mutation.
//!
//! Every write that can move a user between groups runs inside an IMMEDIATE
//! transaction, and the unique index on `group_members(user_id)` (migration
//! v002) rejects any path that would leave a user in two groups.

use std::collections::HashSet;

use quad_shared::permissions::GroupAction;
use quad_shared::{GroupId, GroupRole, UserId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{row_exists, Database};
use crate::error::{Result, StoreError};
use crate::models::{Group, MemberPage, Membership, NewGroup};
use crate::timestamp;

const MEMBERSHIP_COLUMNS: &str = "group_id, user_id, role, joined_at";

impl Database {
    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group with its creator as `admin` and the listed initial
    /// members, pulling every participant out of whatever group they were in.
    ///
    /// Validation and existence checks happen before the transaction starts.
    /// All writes commit together or not at all.
    pub fn create_group(&mut self, new: &NewGroup) -> Result<Group> {
        let name = new.group_name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid("group_name is required"));
        }
        if !new.created_by.is_valid() {
            return Err(StoreError::invalid("created_by must be a valid user id"));
        }

        let mut seen = HashSet::new();
        for member in &new.initial_members {
            if !member.user_id.is_valid() {
                return Err(StoreError::invalid(format!(
                    "Invalid initial member id {}",
                    member.user_id
                )));
            }
            if member.user_id == new.created_by {
                return Err(StoreError::invalid(
                    "The creator cannot also be listed as an initial member",
                ));
            }
            if !seen.insert(member.user_id) {
                return Err(StoreError::invalid(format!(
                    "Duplicate initial member {}",
                    member.user_id
                )));
            }
        }

        let participants: Vec<UserId> = std::iter::once(new.created_by)
            .chain(new.initial_members.iter().map(|m| m.user_id))
            .collect();
        self.require_users(&participants)?;

        let now = timestamp::now();
        let stamp = timestamp::encode(&now);
        let tx = self.write_txn()?;

        tx.execute(
            r#"INSERT INTO "groups" (group_name, group_pic_url, created_by, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![name, new.group_pic_url, new.created_by.0, stamp],
        )?;
        let group_id = GroupId(tx.last_insert_rowid());

        {
            let mut leave = tx.prepare("DELETE FROM group_members WHERE user_id = ?1")?;
            for user in &participants {
                leave.execute(params![user.0])?;
            }

            let mut join = tx.prepare(
                "INSERT INTO group_members (group_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            join.execute(params![
                group_id.0,
                new.created_by.0,
                GroupRole::Admin.as_str(),
                stamp
            ])?;
            for member in &new.initial_members {
                let role = GroupRole::or_member(member.role.as_deref());
                join.execute(params![group_id.0, member.user_id.0, role.as_str(), stamp])?;
            }
        }

        tx.commit()?;

        tracing::info!(
            group = %group_id,
            creator = %new.created_by,
            members = participants.len(),
            "group created"
        );

        Ok(Group {
            id: group_id,
            group_name: name.to_string(),
            group_pic_url: new.group_pic_url.clone(),
            created_by: new.created_by,
            created_at: now,
        })
    }

    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        self.conn()
            .query_row(
                r#"SELECT id, group_name, group_pic_url, created_by, created_at
                   FROM "groups" WHERE id = ?1"#,
                params![id.0],
                |row| {
                    Ok(Group {
                        id: GroupId(row.get(0)?),
                        group_name: row.get(1)?,
                        group_pic_url: row.get(2)?,
                        created_by: UserId(row.get(3)?),
                        created_at: timestamp::column(row, 4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("Group not found"))
    }

    // ------------------------------------------------------------------
    // Membership writes
    // ------------------------------------------------------------------

    /// Put `user` into `group`, leaving any other group in the same write.
    ///
    /// `role` defaults to `member`; an unrecognised role is rejected.
    pub fn add_member(
        &mut self,
        group: GroupId,
        user: UserId,
        role: Option<&str>,
    ) -> Result<Membership> {
        let role = match role {
            Some(raw) => raw
                .parse::<GroupRole>()
                .map_err(|_| StoreError::invalid(format!("Invalid role: {raw}")))?,
            None => GroupRole::Member,
        };
        if !self.group_exists(group)? {
            return Err(StoreError::not_found("Group not found"));
        }
        if !self.user_exists(user)? {
            return Err(StoreError::not_found("User not found"));
        }

        let now = timestamp::now();
        let tx = self.write_txn()?;

        let previous = current_group(&tx, user)?;
        if previous == Some(group) {
            return Err(StoreError::conflict("User is already a member of the group"));
        }

        tx.execute(
            "INSERT INTO group_members (group_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id) DO UPDATE SET
                 group_id  = excluded.group_id,
                 role      = excluded.role,
                 joined_at = excluded.joined_at",
            params![group.0, user.0, role.as_str(), timestamp::encode(&now)],
        )?;
        tx.commit()?;

        match previous {
            Some(left) => {
                tracing::info!(user = %user, group = %group, left = %left, role = %role, "member moved")
            }
            None => tracing::info!(user = %user, group = %group, role = %role, "member added"),
        }

        Ok(Membership {
            group_id: group,
            user_id: user,
            role,
            joined_at: now,
        })
    }

    /// Remove `target` from `group`. Only admins and co-admins may do this.
    pub fn remove_member(
        &mut self,
        group: GroupId,
        target: UserId,
        requested_by: UserId,
    ) -> Result<()> {
        let tx = self.write_txn()?;
        authorize(&tx, group, requested_by, GroupAction::RemoveMember)?;

        let removed = tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group.0, target.0],
        )?;
        if removed == 0 {
            return Err(StoreError::not_found("User not found in group"));
        }
        tx.commit()?;

        tracing::info!(group = %group, target = %target, by = %requested_by, "member removed");
        Ok(())
    }

    /// Change the role of `target` in `group`. Only admins may do this.
    pub fn update_role(
        &mut self,
        group: GroupId,
        target: UserId,
        new_role: &str,
        requested_by: UserId,
    ) -> Result<Membership> {
        let role = new_role
            .parse::<GroupRole>()
            .map_err(|_| StoreError::invalid(format!("Invalid role: {new_role}")))?;

        let tx = self.write_txn()?;
        authorize(&tx, group, requested_by, GroupAction::UpdateRole)?;

        let updated = tx.execute(
            "UPDATE group_members SET role = ?1 WHERE group_id = ?2 AND user_id = ?3",
            params![role.as_str(), group.0, target.0],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("User not found in group"));
        }
        let membership = membership(&tx, group, target)?
            .ok_or_else(|| StoreError::not_found("User not found in group"))?;
        tx.commit()?;

        tracing::info!(group = %group, target = %target, role = %role, by = %requested_by, "role updated");
        Ok(membership)
    }

    // ------------------------------------------------------------------
    // Membership reads
    // ------------------------------------------------------------------

    /// One page of members, oldest first. `page` is 1-based.
    pub fn list_members(&self, group: GroupId, page: i64, limit: i64) -> Result<MemberPage> {
        if limit < 1 {
            return Err(StoreError::invalid("limit must be at least 1"));
        }
        if page < 1 {
            return Err(StoreError::invalid("page must be at least 1"));
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| StoreError::invalid("page or limit is too large"))?;

        let total_members: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
            params![group.0],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM group_members
             WHERE group_id = ?1
             ORDER BY joined_at ASC, rowid ASC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let members = stmt
            .query_map(params![group.0, limit, offset], row_to_membership)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(MemberPage {
            page,
            limit,
            total_members,
            total_pages: page_count(total_members, limit),
            members,
        })
    }

    pub fn get_membership(&self, group: GroupId, user: UserId) -> Result<Membership> {
        membership(self.conn(), group, user)?
            .ok_or_else(|| StoreError::not_found("Membership not found"))
    }

    /// The one group `user` currently belongs to, if any.
    pub fn current_group_of(&self, user: UserId) -> Result<Option<Membership>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {MEMBERSHIP_COLUMNS} FROM group_members WHERE user_id = ?1"),
                params![user.0],
                row_to_membership,
            )
            .optional()?)
    }

    fn group_exists(&self, id: GroupId) -> Result<bool> {
        row_exists(self.conn(), r#"SELECT 1 FROM "groups" WHERE id = ?1"#, params![id.0])
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fail with `Forbidden` unless `actor` holds a role in `group` that the
/// permission table allows for `action`.
fn authorize(conn: &Connection, group: GroupId, actor: UserId, action: GroupAction) -> Result<()> {
    let role = membership(conn, group, actor)?.map(|m| m.role);
    match role {
        Some(role) if action.permits(role) => Ok(()),
        Some(role) => {
            tracing::debug!(group = %group, actor = %actor, role = %role, ?action, "group action denied");
            Err(StoreError::Forbidden(action.denial().to_string()))
        }
        None => Err(StoreError::Forbidden(
            "Requesting user is not a member of the group".to_string(),
        )),
    }
}

fn membership(conn: &Connection, group: GroupId, user: UserId) -> Result<Option<Membership>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM group_members
                 WHERE group_id = ?1 AND user_id = ?2"
            ),
            params![group.0, user.0],
            row_to_membership,
        )
        .optional()?)
}

/// Ceiling of `total / limit` for `total >= 0` and `limit >= 1`.
fn page_count(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total - 1) / limit + 1
    }
}

fn current_group(conn: &Connection, user: UserId) -> Result<Option<GroupId>> {
    Ok(conn
        .query_row(
            "SELECT group_id FROM group_members WHERE user_id = ?1",
            params![user.0],
            |row| row.get(0).map(GroupId),
        )
        .optional()?)
}

fn row_to_membership(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
    let raw_role: String = row.get(2)?;
    let role = raw_role.parse::<GroupRole>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Membership {
        group_id: GroupId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        role,
        joined_at: timestamp::column(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InitialMember;
    use crate::users::seed_user;

    fn new_group(name: &str, creator: UserId, members: &[(UserId, Option<&str>)]) -> NewGroup {
        NewGroup {
            group_name: name.to_string(),
            group_pic_url: None,
            created_by: creator,
            initial_members: members
                .iter()
                .map(|(id, role)| InitialMember {
                    user_id: *id,
                    role: role.map(str::to_string),
                })
                .collect(),
        }
    }

    fn seeded(n: usize) -> (Database, Vec<UserId>) {
        let db = Database::open_in_memory().unwrap();
        let users = (0..n).map(|i| seed_user(&db, &format!("user{i}"))).collect();
        (db, users)
    }

    #[test]
    fn test_create_group_assigns_roles_and_moves_members() {
        let (mut db, u) = seeded(4);
        let old = db.create_group(&new_group("Old", u[2], &[(u[1], None)])).unwrap();

        let g = db
            .create_group(&new_group(
                "G",
                u[0],
                &[(u[1], None), (u[3], Some("co-admin"))],
            ))
            .unwrap();

        assert_eq!(db.get_membership(g.id, u[0]).unwrap().role, GroupRole::Admin);
        assert_eq!(db.get_membership(g.id, u[1]).unwrap().role, GroupRole::Member);
        assert_eq!(db.get_membership(g.id, u[3]).unwrap().role, GroupRole::CoAdmin);
        assert!(matches!(
            db.get_membership(old.id, u[1]),
            Err(StoreError::NotFound(_))
        ));
        // The old creator was not a participant and stays put.
        assert_eq!(db.current_group_of(u[2]).unwrap().unwrap().group_id, old.id);
    }

    #[test]
    fn test_create_group_unknown_role_defaults_to_member() {
        let (mut db, u) = seeded(2);
        let g = db
            .create_group(&new_group("G", u[0], &[(u[1], Some("overlord"))]))
            .unwrap();
        assert_eq!(db.get_membership(g.id, u[1]).unwrap().role, GroupRole::Member);
    }

    #[test]
    fn test_create_group_validation() {
        let (mut db, u) = seeded(2);
        for bad in [
            new_group("   ", u[0], &[]),
            new_group("G", UserId(0), &[]),
            new_group("G", u[0], &[(u[0], None)]),
            new_group("G", u[0], &[(u[1], None), (u[1], Some("guest"))]),
        ] {
            assert!(matches!(db.create_group(&bad), Err(StoreError::Invalid(_))));
        }
    }

    #[test]
    fn test_create_group_missing_user_leaves_memberships_untouched() {
        let (mut db, u) = seeded(2);
        let g = db.create_group(&new_group("G", u[0], &[(u[1], None)])).unwrap();

        let result = db.create_group(&new_group("H", u[1], &[(UserId(999), None)]));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(db.current_group_of(u[1]).unwrap().unwrap().group_id, g.id);
    }

    #[test]
    fn test_failed_join_rolls_back_whole_group_creation() {
        let (mut db, u) = seeded(3);
        let g = db.create_group(&new_group("G", u[0], &[(u[1], None)])).unwrap();
        db.conn()
            .execute_batch(&format!(
                "CREATE TRIGGER reject_join BEFORE INSERT ON group_members
                 WHEN NEW.user_id = {} BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                u[2].0
            ))
            .unwrap();

        // The group row and u[1]'s departure are written before u[2] fails.
        let result = db.create_group(&new_group("H", u[1], &[(u[2], None)]));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));

        let groups: i64 = db
            .conn()
            .query_row(r#"SELECT COUNT(*) FROM "groups""#, [], |row| row.get(0))
            .unwrap();
        assert_eq!(groups, 1);
        assert_eq!(db.current_group_of(u[1]).unwrap().unwrap().group_id, g.id);
        assert!(db.current_group_of(u[2]).unwrap().is_none());
        assert_eq!(db.list_members(g.id, 1, 10).unwrap().total_members, 2);
    }

    #[test]
    fn test_add_member_moves_between_groups() {
        let (mut db, u) = seeded(3);
        let g1 = db.create_group(&new_group("G1", u[0], &[(u[2], None)])).unwrap();
        let g2 = db.create_group(&new_group("G2", u[1], &[])).unwrap();

        let m = db.add_member(g2.id, u[2], None).unwrap();
        assert_eq!(m.role, GroupRole::Member);
        assert_eq!(db.current_group_of(u[2]).unwrap().unwrap().group_id, g2.id);
        assert!(db.get_membership(g1.id, u[2]).is_err());
    }

    #[test]
    fn test_add_member_errors() {
        let (mut db, u) = seeded(2);
        let g = db.create_group(&new_group("G", u[0], &[(u[1], None)])).unwrap();

        assert!(matches!(
            db.add_member(g.id, u[1], Some("guest")),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.add_member(g.id, u[1], Some("owner")),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            db.add_member(GroupId(99), u[1], None),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            db.add_member(g.id, UserId(99), None),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_adds_leave_exactly_one_membership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");

        let (g1, g2, user) = {
            let mut db = Database::open_at(&path).unwrap();
            let a = seed_user(&db, "a");
            let b = seed_user(&db, "b");
            let user = seed_user(&db, "mover");
            let g1 = db.create_group(&new_group("G1", a, &[])).unwrap().id;
            let g2 = db.create_group(&new_group("G2", b, &[])).unwrap().id;
            (g1, g2, user)
        };

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = [g1, g2]
            .into_iter()
            .map(|group| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut db = Database::open_at(&path).unwrap();
                    barrier.wait();
                    db.add_member(group, user, None).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM group_members WHERE user_id = ?1",
                params![user.0],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_remove_member_permissions() {
        let (mut db, u) = seeded(4);
        let g = db
            .create_group(&new_group(
                "G",
                u[0],
                &[(u[1], Some("co-admin")), (u[2], None), (u[3], None)],
            ))
            .unwrap();

        assert!(matches!(
            db.remove_member(g.id, u[3], u[2]),
            Err(StoreError::Forbidden(_))
        ));
        db.remove_member(g.id, u[3], u[1]).unwrap();
        db.remove_member(g.id, u[2], u[0]).unwrap();
        assert!(matches!(
            db.remove_member(g.id, u[2], u[0]),
            Err(StoreError::NotFound(_))
        ));
        // Outsiders are not members at all.
        assert!(matches!(
            db.remove_member(g.id, u[1], u[3]),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn test_update_role_is_admin_only() {
        let (mut db, u) = seeded(3);
        let g = db
            .create_group(&new_group("G", u[0], &[(u[1], Some("co-admin")), (u[2], None)]))
            .unwrap();

        assert!(matches!(
            db.update_role(g.id, u[2], "guest", u[1]),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.update_role(g.id, u[2], "boss", u[0]),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            db.update_role(g.id, UserId(50), "guest", u[0]),
            Err(StoreError::NotFound(_))
        ));

        let m = db.update_role(g.id, u[2], "guest", u[0]).unwrap();
        assert_eq!(m.role, GroupRole::Guest);
        assert_eq!(db.get_membership(g.id, u[2]).unwrap().role, GroupRole::Guest);
    }

    #[test]
    fn test_list_members_paginates_in_join_order() {
        let (mut db, u) = seeded(5);
        let g = db
            .create_group(&new_group("G", u[0], &[(u[1], None), (u[2], None)]))
            .unwrap();
        db.add_member(g.id, u[3], None).unwrap();
        db.add_member(g.id, u[4], None).unwrap();

        let first = db.list_members(g.id, 1, 2).unwrap();
        assert_eq!(first.total_members, 5);
        assert_eq!(first.total_pages, 3);
        let ids: Vec<_> = first.members.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![u[0], u[1]]);

        let last = db.list_members(g.id, 3, 2).unwrap();
        assert_eq!(last.members.len(), 1);
        assert_eq!(last.members[0].user_id, u[4]);

        assert!(db.list_members(g.id, 9, 2).unwrap().members.is_empty());
    }

    #[test]
    fn test_list_members_validation() {
        let (db, _) = seeded(0);
        assert!(matches!(db.list_members(GroupId(1), 1, 0), Err(StoreError::Invalid(_))));
        assert!(matches!(db.list_members(GroupId(1), 0, 10), Err(StoreError::Invalid(_))));
        assert!(matches!(db.list_members(GroupId(1), i64::MIN, 10), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_list_members_with_huge_limit() {
        let (mut db, u) = seeded(2);
        let g = db.create_group(&new_group("G", u[0], &[(u[1], None)])).unwrap();

        let page = db.list_members(g.id, 1, i64::MAX).unwrap();
        assert_eq!(page.total_members, 2);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.members.len(), 2);

        match db.list_members(g.id, 3, i64::MAX) {
            Err(StoreError::Invalid(msg)) => assert!(msg.contains("too large")),
            other => panic!("expected Invalid, got {other:?}"),
        }
        // The handle is still usable afterwards.
        assert_eq!(db.list_members(g.id, 1, 10).unwrap().total_pages, 1);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(i64::MAX, 1), i64::MAX);
        assert_eq!(page_count(1, i64::MAX), 1);
    }

    #[test]
    fn test_get_group() {
        let (mut db, u) = seeded(1);
        let g = db.create_group(&new_group("  Robotics ", u[0], &[])).unwrap();
        let fetched = db.get_group(g.id).unwrap();
        assert_eq!(fetched.group_name, "Robotics");
        assert_eq!(fetched.created_by, u[0]);
        assert!(matches!(db.get_group(GroupId(77)), Err(StoreError::NotFound(_))));
    }
}
