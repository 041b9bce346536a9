//! Project room lookup
//!
//! The relay never owns project records; it only asks a directory whether a
//! room exists before admitting a connection into it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::RoomId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("project id is missing or malformed")]
    InvalidId,
    #[error("project not found")]
    NotFound,
    #[error("project lookup failed: {0}")]
    Lookup(String),
}

impl RoomError {
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::InvalidId => "INVALID_PROJECT_ID",
            RoomError::NotFound => "PROJECT_NOT_FOUND",
            RoomError::Lookup(_) => "PROJECT_LOOKUP_FAILED",
        }
    }
}

/// Persisted project metadata, as much of it as the relay needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
}

/// Resolves room identifiers against the project store
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// `Ok(None)` means the store answered and the room does not exist.
    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<RoomRecord>, RoomError>;
}

/// Directory held in memory, seeded at startup
#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: RwLock<HashMap<RoomId, RoomRecord>>,
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rooms(rooms: impl IntoIterator<Item = RoomRecord>) -> Self {
        Self {
            rooms: RwLock::new(rooms.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Seed from `PROJECT_IDS`, a comma-separated list of `id` or `id:name`
    /// entries. Malformed ids are skipped with a warning.
    pub fn from_env() -> Self {
        let raw = std::env::var("PROJECT_IDS").unwrap_or_default();
        let rooms = parse_room_list(&raw);
        tracing::info!(count = rooms.len(), "Loaded project rooms");
        Self::with_rooms(rooms)
    }

    pub async fn insert(&self, record: RoomRecord) {
        self.rooms.write().await.insert(record.id.clone(), record);
    }

    pub async fn remove(&self, id: &RoomId) -> Option<RoomRecord> {
        self.rooms.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<RoomRecord>, RoomError> {
        Ok(self.rooms.read().await.get(id).cloned())
    }
}

fn parse_room_list(raw: &str) -> Vec<RoomRecord> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (id, name) = match entry.split_once(':') {
                Some((id, name)) => (id.trim(), name.trim()),
                None => (entry, ""),
            };
            match RoomId::parse(id) {
                Some(id) => Some(RoomRecord {
                    name: if name.is_empty() {
                        id.to_string()
                    } else {
                        name.to_string()
                    },
                    id,
                }),
                None => {
                    tracing::warn!(entry, "Skipping malformed project id");
                    None
                }
            }
        })
        .collect()
}
