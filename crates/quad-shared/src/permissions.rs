//! Explicit role table for privileged group operations.
//!
//! Roles are not ordered. Each operation lists exactly the roles allowed to
//! perform it, so that co-admins can remove members but cannot change roles.

use crate::types::GroupRole;

/// Privileged mutations of a group's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    RemoveMember,
    UpdateRole,
}

impl GroupAction {
    /// Roles allowed to perform this action.
    pub const fn permitted_roles(self) -> &'static [GroupRole] {
        match self {
            Self::RemoveMember => &[GroupRole::Admin, GroupRole::CoAdmin],
            Self::UpdateRole => &[GroupRole::Admin],
        }
    }

    pub fn permits(self, role: GroupRole) -> bool {
        self.permitted_roles().contains(&role)
    }

    /// Human-readable rejection used in `Forbidden` errors.
    pub fn denial(self) -> &'static str {
        match self {
            Self::RemoveMember => "Only admin or co-admin can remove members",
            Self::UpdateRole => "Only admins can update roles",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_member_roles() {
        assert!(GroupAction::RemoveMember.permits(GroupRole::Admin));
        assert!(GroupAction::RemoveMember.permits(GroupRole::CoAdmin));
        assert!(!GroupAction::RemoveMember.permits(GroupRole::Member));
        assert!(!GroupAction::RemoveMember.permits(GroupRole::Guest));
    }

    #[test]
    fn test_update_role_is_admin_only() {
        assert!(GroupAction::UpdateRole.permits(GroupRole::Admin));
        assert!(!GroupAction::UpdateRole.permits(GroupRole::CoAdmin));
        assert!(!GroupAction::UpdateRole.permits(GroupRole::Member));
    }
}
