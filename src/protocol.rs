use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Chat message for everyone else in the project room
    ProjectMessage { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once, right after the connection has joined its room
    Welcome {
        session_id: SessionId,
        project_id: RoomId,
        user: Participant,
        server_now: String,
    },
    ProjectMessage {
        message: String,
        sender: Participant,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn project_message(message: impl Into<String>, sender: Participant) -> Self {
        Self::ProjectMessage {
            message: message.into(),
            sender,
        }
    }

    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"project-message","message":"hello"}"#).unwrap();
        match msg {
            ClientMessage::ProjectMessage { message } => assert_eq!(message, "hello"),
        }
    }

    #[test]
    fn test_client_message_rejects_unknown_event() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"t":"join","room":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_wire_format() {
        let msg = ServerMessage::project_message("SUMMARY", Participant::assistant());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "t": "project-message",
                "message": "SUMMARY",
                "sender": { "id": "ai", "email": "AI" }
            })
        );
    }

    #[test]
    fn test_error_wire_format() {
        let value = serde_json::to_value(ServerMessage::error("PARSE_ERROR", "bad")).unwrap();
        assert_eq!(value, json!({ "t": "error", "code": "PARSE_ERROR", "msg": "bad" }));
    }
}
