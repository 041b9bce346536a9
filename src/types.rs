use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-connection handle, unique for the lifetime of the process
pub type SessionId = String;

/// Reserved identity of the inline assistant. Never issued to a real user.
pub const ASSISTANT_ID: &str = "ai";
pub const ASSISTANT_EMAIL: &str = "AI";

/// Identifier of a project room.
///
/// Only constructible through [`RoomId::parse`], so a value of this type is
/// always a well-formed store key (24 hexadecimal characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub const LEN: usize = 24;

    /// Parse a raw identifier, returning `None` unless it is exactly
    /// 24 ASCII hex digits. Case is normalised to lowercase.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity attached to every relayed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub email: String,
}

impl Participant {
    /// The synthetic sender used for assistant replies
    pub fn assistant() -> Self {
        Self {
            id: ASSISTANT_ID.to_string(),
            email: ASSISTANT_EMAIL.to_string(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.id == ASSISTANT_ID
    }
}
