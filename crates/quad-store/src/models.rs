//! Domain model structs persisted in the database.
//!
//! Every struct derives `Serialize` so it can be handed straight to the HTTP
//! layer as a JSON body.

use chrono::{DateTime, Utc};
use quad_shared::protocol::StatusUpdate;
use quad_shared::{GroupId, GroupRole, RelationStatus, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user identity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub profile_pic_url: Option<String>,
    pub dept: Option<String>,
    pub yr: Option<String>,
    /// Free-form profile status, unrelated to presence.
    pub status: Option<String>,
    pub last_online: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Claims of an already verified identity, as handed over by the identity
/// provider.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub profile_pic_url: Option<String>,
    pub status: Option<String>,
    pub dept: Option<String>,
    pub yr: Option<String>,
}

impl ProfileUpdate {
    /// Column / value pairs that were actually provided.
    pub(crate) fn provided(&self) -> Vec<(&'static str, &str)> {
        [
            ("username", &self.username),
            ("profile_pic_url", &self.profile_pic_url),
            ("status", &self.status),
            ("dept", &self.dept),
            ("yr", &self.yr),
        ]
        .into_iter()
        .filter_map(|(col, v)| v.as_deref().map(|v| (col, v)))
        .collect()
    }
}

/// Filters for the user search. All optional, combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSearch {
    /// Substring match on the username.
    pub username: Option<String>,
    pub dept: Option<String>,
    pub yr: Option<String>,
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// One directed relationship edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationshipEdge {
    pub user_id: UserId,
    pub friend_id: UserId,
    pub status: RelationStatus,
}

/// A friend as listed for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendSummary {
    pub id: UserId,
    pub username: String,
    pub profile_pic_url: Option<String>,
}

/// A pending request waiting for the listed user to accept it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingRequest {
    pub requester: FriendSummary,
    pub requested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub group_name: String,
    pub group_pic_url: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Input of group creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub group_name: String,
    #[serde(default)]
    pub group_pic_url: Option<String>,
    pub created_by: UserId,
    #[serde(default)]
    pub initial_members: Vec<InitialMember>,
}

/// An initial member of a new group. Unknown roles fall back to `member`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitialMember {
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// One page of a group's member list, oldest members first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberPage {
    pub page: i64,
    pub limit: i64,
    pub total_members: i64,
    pub total_pages: i64,
    pub members: Vec<Membership>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Liveness row of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub status_message: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PresenceRecord {
    /// What an unknown user looks like: offline, never seen.
    pub fn unseen(user_id: UserId) -> Self {
        Self {
            user_id,
            is_online: false,
            last_active_at: None,
            status_message: String::new(),
            updated_at: None,
        }
    }
}

impl From<PresenceRecord> for StatusUpdate {
    fn from(record: PresenceRecord) -> Self {
        StatusUpdate {
            user_id: record.user_id,
            is_online: record.is_online,
            status_message: record.status_message,
            last_active_at: record.last_active_at,
            updated_at: record.updated_at,
        }
    }
}
