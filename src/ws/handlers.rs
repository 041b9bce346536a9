//! WebSocket message dispatch
//!
//! Runs after admission, so every message here comes from a bound
//! connection. The sender identity is always the one the gate verified.

use crate::gate::Connection;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::ProjectMessage { message } => {
            handle_project_message(conn, state, message)
        }
    }
}

fn handle_project_message(
    conn: &Connection,
    state: &Arc<AppState>,
    message: String,
) -> Option<ServerMessage> {
    let delivered = state.broadcaster.broadcast(
        &conn.room_id,
        ServerMessage::project_message(message.clone(), conn.user.clone()),
        Some(&conn.session_id),
    );
    tracing::debug!(
        session = %conn.session_id,
        room = %conn.room_id,
        delivered,
        "Relayed project message"
    );

    // Relay first; the assistant only ever sees what others already got
    state.assistant.on_relayed(&conn.room_id, &conn.user, &message);
    None
}
