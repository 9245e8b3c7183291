//! WebSocket endpoint for live presence.
//!
//! Each socket gets a writer task draining its outbound queue while the
//! handler reads inbound JSON text frames and hands them to the
//! [`PresenceBroadcaster`].

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use quad_shared::protocol::ClientEvent;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::broadcaster::PresenceBroadcaster;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| run_session(socket, broadcaster))
}

async fn run_session(socket: WebSocket, broadcaster: PresenceBroadcaster) {
    let (conn, mut outbound) = match broadcaster.connect().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "could not open live session");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "failed to encode server event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientEvent::from_json(text.as_str()) {
                Ok(event) => broadcaster.handle(conn, event).await,
                Err(e) => {
                    broadcaster
                        .reject(conn, format!("Malformed event: {e}"))
                        .await
                }
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum; binary frames carry nothing for us.
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %conn, error = %e, "socket read failed");
                break;
            }
        }
    }

    broadcaster.disconnect(conn).await;
    writer.abort();
}
