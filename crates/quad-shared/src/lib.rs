//! # quad-shared
//!
//! Types shared by the Quad store and server: identifiers, relationship and
//! group-role enums, the group permission table, and the live-connection
//! wire protocol.

pub mod constants;
pub mod error;
pub mod permissions;
pub mod protocol;
pub mod types;

pub use error::ParseError;
pub use types::{GroupId, GroupRole, RelationStatus, UserId};
