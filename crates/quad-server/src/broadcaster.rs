//! Live presence fan-out.
//!
//! [`SessionTable`] holds the transient set of live connections. It is owned
//! by [`PresenceBroadcaster`], which persists every presence signal through
//! the store first and then pushes the resulting record to all sessions.

use std::collections::HashMap;
use std::sync::Arc;

use quad_shared::protocol::{ClientEvent, ServerEvent, StatusUpdate};
use quad_shared::UserId;
use quad_store::PresenceRecord;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::store::Store;

/// Identifier of one live connection.
pub type ConnId = Uuid;

struct Session {
    user: Option<UserId>,
    tx: mpsc::Sender<ServerEvent>,
}

/// Result of binding a connection to the user it claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The connection already spoke for this user.
    Bound,
    /// First claim on this connection.
    Claimed,
    /// The connection already speaks for another user.
    Mismatch(UserId),
    UnknownConnection,
}

#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<ConnId, Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, tx: mpsc::Sender<ServerEvent>) -> ConnId {
        let conn = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.insert(conn, Session { user: None, tx });
        debug!(conn = %conn, live = sessions.len(), "session registered");
        conn
    }

    /// Bind `conn` to `user` on first claim. Later claims must match.
    pub async fn bind_user(&self, conn: ConnId, user: UserId) -> Binding {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&conn) else {
            return Binding::UnknownConnection;
        };
        match session.user {
            None => {
                session.user = Some(user);
                debug!(conn = %conn, user = %user, "session bound");
                Binding::Claimed
            }
            Some(bound) if bound == user => Binding::Bound,
            Some(bound) => Binding::Mismatch(bound),
        }
    }

    /// Release the user claim on `conn`, keeping the connection itself.
    pub async fn unbind(&self, conn: ConnId) {
        if let Some(session) = self.sessions.write().await.get_mut(&conn) {
            session.user = None;
        }
    }

    /// Drop `conn`, returning the user it was bound to.
    pub async fn unregister(&self, conn: ConnId) -> Option<UserId> {
        let mut sessions = self.sessions.write().await;
        let user = sessions.remove(&conn).and_then(|s| s.user);
        debug!(conn = %conn, live = sessions.len(), "session unregistered");
        user
    }

    /// Number of live connections bound to `user`.
    pub async fn sessions_for_user(&self, user: UserId) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.user == Some(user))
            .count()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Queue `event` for one connection only.
    pub async fn send_to(&self, conn: ConnId, event: ServerEvent) {
        let sessions = self.sessions.read().await;
        if let Some(session) = sessions.get(&conn) {
            if session.tx.try_send(event).is_err() {
                debug!(conn = %conn, "Dropping event for slow connection");
            }
        }
    }

    /// Deliver `event` to `origin` first, then to every other connection.
    ///
    /// A full or closed queue drops the event for that connection only.
    pub async fn fan_out(&self, origin: Option<ConnId>, event: &ServerEvent) {
        let sessions = self.sessions.read().await;

        let origin_session = origin.and_then(|id| sessions.get(&id).map(|s| (id, s)));
        let others = sessions
            .iter()
            .filter(|(id, _)| Some(**id) != origin)
            .map(|(id, s)| (*id, s));

        for (conn, session) in origin_session.into_iter().chain(others) {
            if session.tx.try_send(event.clone()).is_err() {
                debug!(conn = %conn, "Dropping event for slow connection");
            }
        }
    }
}

/// A presence signal, whichever surface it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceSignal {
    Online,
    Offline,
    Heartbeat,
    StatusMessage(String),
}

impl PresenceSignal {
    /// Split a live-connection event into the claimed user and the signal.
    pub fn from_event(event: ClientEvent) -> (UserId, Self) {
        match event {
            ClientEvent::Online(c) => (c.user_id, Self::Online),
            ClientEvent::Offline(c) => (c.user_id, Self::Offline),
            ClientEvent::Heartbeat(c) => (c.user_id, Self::Heartbeat),
            ClientEvent::StatusMessage(c) => (c.user_id, Self::StatusMessage(c.status_message)),
        }
    }
}

#[derive(Clone)]
pub struct PresenceBroadcaster {
    store: Store,
    sessions: SessionTable,
    /// Held across a session-table change and the presence write it implies.
    transitions: Arc<Mutex<()>>,
    offline_on_disconnect: bool,
    session_buffer: usize,
}

impl PresenceBroadcaster {
    pub fn new(store: Store, sessions: SessionTable, config: &ServerConfig) -> Self {
        Self {
            store,
            sessions,
            transitions: Arc::new(Mutex::new(())),
            offline_on_disconnect: config.offline_on_disconnect,
            session_buffer: config.session_buffer,
        }
    }

    /// Register a new live connection and queue the online-users snapshot
    /// for it alone.
    pub async fn connect(&self) -> Result<(ConnId, mpsc::Receiver<ServerEvent>), ServerError> {
        let (tx, rx) = mpsc::channel(self.session_buffer);
        let conn = self.sessions.register(tx).await;

        let online = match self.store.call(|db| db.list_online()).await {
            Ok(online) => online,
            Err(e) => {
                self.sessions.unregister(conn).await;
                return Err(e);
            }
        };
        let snapshot: Vec<StatusUpdate> = online.into_iter().map(StatusUpdate::from).collect();
        let live = self.sessions.len().await;
        info!(conn = %conn, online = snapshot.len(), live, "live connection opened");

        self.sessions
            .send_to(conn, ServerEvent::OnlineUsersSnapshot(snapshot))
            .await;
        Ok((conn, rx))
    }

    /// Handle one inbound event from a live connection.
    ///
    /// Rejections are reported back to that connection as `error` events.
    pub async fn handle(&self, conn: ConnId, event: ClientEvent) {
        let (user, signal) = PresenceSignal::from_event(event);

        if !user.is_valid() {
            self.reject(conn, format!("Invalid user id {user}")).await;
            return;
        }

        let _transition = self.transitions.lock().await;
        let binding = self.sessions.bind_user(conn, user).await;
        match binding {
            Binding::Bound | Binding::Claimed => {}
            Binding::Mismatch(bound) => {
                warn!(conn = %conn, bound = %bound, claimed = %user, "identity mismatch on connection");
                self.reject(conn, format!("Connection is bound to user {bound}"))
                    .await;
                return;
            }
            Binding::UnknownConnection => return,
        }

        if let Err(e) = self.apply(Some(conn), user, signal).await {
            if binding == Binding::Claimed {
                self.sessions.unbind(conn).await;
            }
            self.reject(conn, e.public_message()).await;
        }
    }

    /// Persist `signal` for `user`, then fan the resulting record out.
    ///
    /// `origin` is the connection the signal came from, if any; it receives
    /// the update first.
    pub async fn apply(
        &self,
        origin: Option<ConnId>,
        user: UserId,
        signal: PresenceSignal,
    ) -> Result<PresenceRecord, ServerError> {
        let record = self
            .store
            .call(move |db| match signal {
                PresenceSignal::Online => db.set_online(user),
                PresenceSignal::Offline => db.set_offline(user),
                PresenceSignal::Heartbeat => db.touch_activity(user),
                PresenceSignal::StatusMessage(text) => db.set_status_message(user, &text),
            })
            .await?;

        self.publish(origin, record.clone()).await;
        Ok(record)
    }

    pub async fn publish(&self, origin: Option<ConnId>, record: PresenceRecord) {
        let event = ServerEvent::StatusUpdate(record.into());
        self.sessions.fan_out(origin, &event).await;
    }

    /// Report a rejected signal to `conn` only.
    pub async fn reject(&self, conn: ConnId, message: String) {
        debug!(conn = %conn, %message, "signal rejected");
        self.sessions
            .send_to(conn, ServerEvent::Error { message })
            .await;
    }

    /// Remove `conn`. If it was the bound user's last live connection and
    /// offline-on-disconnect is enabled, the user goes offline.
    pub async fn disconnect(&self, conn: ConnId) {
        let _transition = self.transitions.lock().await;
        let user = self.sessions.unregister(conn).await;
        info!(conn = %conn, user = ?user, "live connection closed");

        let Some(user) = user else { return };
        if !self.offline_on_disconnect || self.sessions.sessions_for_user(user).await > 0 {
            return;
        }

        if let Err(e) = self.apply(None, user, PresenceSignal::Offline).await {
            warn!(user = %user, error = %e, "failed to mark user offline on disconnect");
        }
    }
}
