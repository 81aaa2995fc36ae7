// crates/server/src/routes/events.rs
//! WebSocket event stream for the dashboard.
//!
//! - `WS /api/events?channels=a,b` -- backlog, then live log lines and job events

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use mc_dashboard_core::{Broadcaster, ViewerEvent, ViewerId};
use serde::Deserialize;

use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Unsubscribes the viewer when the socket task ends, however it ends.
struct ConnectionGuard {
    viewer: ViewerId,
    broadcaster: Arc<Broadcaster>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.viewer);
        tracing::debug!(viewer = %self.viewer, "viewer disconnected, unsubscribed");
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated channel names; absent means every channel.
    pub channels: Option<String>,
}

impl EventsQuery {
    fn channels(&self, broadcaster: &Broadcaster) -> Vec<String> {
        match self.channels.as_deref() {
            None => broadcaster.channels(),
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Messages a viewer may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    Ping,
    Subscribe { channel: String },
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(ws_events_handler))
}

async fn ws_events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let channels = query.channels(&state.broadcaster);
    let broadcaster = Arc::clone(&state.broadcaster);
    // Registration happens inside the upgrade callback so a client that
    // drops during the handshake never leaves a viewer behind.
    ws.on_upgrade(move |socket| handle_events_ws(socket, broadcaster, channels))
}

async fn send_event(socket: &mut WebSocket, event: &ViewerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize viewer event");
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn send_error(socket: &mut WebSocket, message: String) -> bool {
    let msg = serde_json::json!({ "type": "error", "message": message });
    socket.send(Message::Text(msg.to_string().into())).await.is_ok()
}

/// Subscribe and push the channel's backlog. Returns false once the socket is gone.
async fn subscribe_channel(
    socket: &mut WebSocket,
    broadcaster: &Broadcaster,
    viewer: ViewerId,
    channel: &str,
) -> bool {
    match broadcaster.subscribe(viewer, channel).await {
        Ok(Some(text)) => {
            let backlog = ViewerEvent::Backlog {
                channel: channel.to_string(),
                text,
            };
            send_event(socket, &backlog).await
        }
        Ok(None) => true,
        Err(e) => {
            tracing::debug!(viewer = %viewer, channel = %channel, error = %e, "subscribe rejected");
            send_error(socket, e.to_string()).await
        }
    }
}

/// Lifecycle of one viewer socket:
/// 1. Subscribe to the requested channels, sending each backlog
/// 2. Forward queued events
/// 3. Answer client messages and keep the connection alive with Ping frames
async fn handle_events_ws(
    mut socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    channels: Vec<String>,
) {
    let mut viewer = broadcaster.connect();
    let _guard = ConnectionGuard {
        viewer: viewer.id,
        broadcaster: Arc::clone(&broadcaster),
    };

    // Backlogs go out before anything from the queue, so history always
    // precedes the live lines registered alongside it.
    for channel in &channels {
        if !subscribe_channel(&mut socket, &broadcaster, viewer.id, channel).await {
            return;
        }
    }

    tracing::info!(viewer = %viewer.id, channels = ?channels, "event viewer connected");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = viewer.events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(viewer = %viewer.id, "viewer queue closed");
                    return;
                };
                if !send_event(&mut socket, &event).await {
                    return;
                }
            }

            client_msg = socket.recv() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                let pong = serde_json::json!({ "type": "pong" });
                                if socket
                                    .send(Message::Text(pong.to_string().into()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Ok(ClientMessage::Subscribe { channel }) => {
                                let alive = subscribe_channel(
                                    &mut socket,
                                    &broadcaster,
                                    viewer.id,
                                    &channel,
                                )
                                .await;
                                if !alive {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(
                                    viewer = %viewer.id,
                                    error = %e,
                                    "ignoring unrecognized client message"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(viewer = %viewer.id, error = %e, "websocket receive error");
                        return;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
