//! Session push endpoint: `GET /ws?userID=` upgrades to a WebSocket and
//! registers the user's push channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::info;

use crate::handlers::AppState;
use crate::sessions::SessionRegistry;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userID")]
    pub user_id: String,
}

pub async fn ws_session(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if query.user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing userID").into_response();
    }
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| handle_session(socket, sessions, query.user_id))
        .into_response()
}

/// Incoming frames are discarded; the reader only detects close. Outgoing
/// pushes arrive over the registry channel and any send failure tears the
/// session down.
async fn handle_session(socket: WebSocket, sessions: SessionRegistry, user_id: String) {
    info!(user_id = %user_id, "session connected");
    let (conn_id, mut pushes) = sessions.register(&user_id);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            push = pushes.recv() => {
                let Some(text) = push else { break };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    sessions.unregister(&user_id, conn_id);
    info!(user_id = %user_id, "session disconnected");
}
