pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::broadcast::member_channel;
use crate::gate::{Admission, HandshakeInputs};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The gate runs before the upgrade, so rejected
/// handshakes get a plain HTTP error and never become sockets.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    let inputs = HandshakeInputs {
        project_id: params.project_id,
        cookie_token: jar
            .get(state.gate.cookie_name())
            .map(|c| c.value().to_string()),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
        handshake_token: params.token,
    };

    match state.gate.authorize(&inputs).await {
        Ok(admission) => ws
            .on_upgrade(move |socket| handle_socket(socket, admission, state))
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle an admitted WebSocket connection
async fn handle_socket(socket: WebSocket, admission: Admission, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = member_channel();
    let conn = admission.bind(&state.broadcaster, tx);

    tracing::info!(
        session = %conn.session_id,
        room = %conn.room_id,
        user = %conn.user.id,
        "WebSocket connected"
    );

    let welcome = ServerMessage::Welcome {
        session_id: conn.session_id.clone(),
        project_id: conn.room_id.clone(),
        user: conn.user.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };

    if send_json(&mut sender, &welcome).await {
        loop {
            tokio::select! {
                // Room traffic queued for this member
                queued = rx.recv() => {
                    match queued {
                        Some(msg) => {
                            if !send_json(&mut sender, &msg).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // Handle client messages
                ws_msg = receiver.next() => {
                    match ws_msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(client_msg) => {
                                    if let Some(response) =
                                        handlers::handle_message(client_msg, &conn, &state).await
                                    {
                                        if !send_json(&mut sender, &response).await {
                                            break;
                                        }
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(session = %conn.session_id, "Unparseable client message: {}", e);
                                    let error = ServerMessage::error(
                                        "PARSE_ERROR",
                                        format!("Invalid message format: {}", e),
                                    );
                                    if !send_json(&mut sender, &error).await {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) => break,
                        Some(Ok(Message::Ping(data))) => {
                            if sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(session = %conn.session_id, "WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    } else {
        tracing::error!(session = %conn.session_id, "Failed to send welcome message");
    }

    state.broadcaster.leave(&conn.room_id, &conn.session_id);
    tracing::info!(
        session = %conn.session_id,
        room = %conn.room_id,
        "WebSocket connection closed"
    );
}
