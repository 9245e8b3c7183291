use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Events a live connection may send to the server.
///
/// Encoded as JSON text frames: `{"event": "online", "data": {"userId": 5}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Online(PresenceClaim),
    Offline(PresenceClaim),
    Heartbeat(PresenceClaim),
    StatusMessage(StatusMessageClaim),
}

/// A presence signal bound to the user identity the connection claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceClaim {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessageClaim {
    pub user_id: UserId,
    pub status_message: String,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events pushed from the server to live connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// One user's presence changed (unicast to origin + broadcast to all others).
    StatusUpdate(StatusUpdate),
    /// Full list of online users, sent once to a freshly opened connection.
    OnlineUsersSnapshot(Vec<StatusUpdate>),
    /// A signal from this connection was rejected.
    Error { message: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Presence notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub user_id: UserId,
    pub is_online: bool,
    pub status_message: String,
    pub last_active_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let event = ClientEvent::from_json(r#"{"event":"heartbeat","data":{"userId":5}}"#).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat(PresenceClaim { user_id: UserId(5) }));

        let event = ClientEvent::from_json(
            r#"{"event":"status-message","data":{"userId":9,"statusMessage":"in the lab"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::StatusMessage(StatusMessageClaim {
                user_id: UserId(9),
                status_message: "in the lab".into(),
            })
        );
    }

    #[test]
    fn test_client_event_rejects_unknown() {
        assert!(ClientEvent::from_json(r#"{"event":"dance","data":{"userId":5}}"#).is_err());
        assert!(ClientEvent::from_json(r#"{"event":"online","data":{}}"#).is_err());
    }

    #[test]
    fn test_server_event_tags() {
        let update = StatusUpdate {
            user_id: UserId(3),
            is_online: true,
            status_message: String::new(),
            last_active_at: None,
            updated_at: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::StatusUpdate(update.clone()).to_json().unwrap())
                .unwrap();
        assert_eq!(json["event"], "status-update");
        assert_eq!(json["data"]["user_id"], 3);
        assert_eq!(json["data"]["is_online"], true);

        let json: serde_json::Value = serde_json::from_str(
            &ServerEvent::OnlineUsersSnapshot(vec![update]).to_json().unwrap(),
        )
        .unwrap();
        assert_eq!(json["event"], "online-users-snapshot");
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
    }
}
