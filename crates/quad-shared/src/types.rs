use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

// User identity = numeric id handed over by the identity provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Ids are positive row ids; anything else never names a real user.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of one directed relationship edge `(user_id -> friend_id)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RelationStatus {
    Pending,
    Accepted,
    Blocked,
}

impl RelationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Blocked => "blocked",
        }
    }
}

impl FromStr for RelationStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "blocked" => Ok(Self::Blocked),
            other => Err(ParseError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RelationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a user inside a group.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GroupRole {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "co-admin")]
    CoAdmin,
    #[default]
    #[serde(rename = "member")]
    Member,
    #[serde(rename = "guest")]
    Guest,
}

impl GroupRole {
    pub const ALL: [GroupRole; 4] = [Self::Admin, Self::CoAdmin, Self::Member, Self::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::CoAdmin => "co-admin",
            Self::Member => "member",
            Self::Guest => "guest",
        }
    }

    /// Lenient parse used for initial members of a new group: anything
    /// missing or unrecognised becomes a plain member.
    pub fn or_member(raw: Option<&str>) -> Self {
        raw.and_then(|r| r.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for GroupRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseError::UnknownRole(s.to_string()))
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action requested on the block/unblock endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAction {
    Block,
    Unblock,
}

impl BlockAction {
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block)
    }
}

impl FromStr for BlockAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "unblock" => Ok(Self::Unblock),
            other => Err(ParseError::UnknownAction(other.to_string())),
        }
    }
}
