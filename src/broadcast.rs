//! Per-room fan-out
//!
//! Each bound connection owns a bounded queue; the broadcaster keeps the
//! queue senders grouped by room. Rooms live in a sharded map so traffic in
//! one room never waits on a lock held for another.

use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::ServerMessage;
use crate::types::{RoomId, SessionId};

/// Capacity of each member's outbound queue. A member that falls this far
/// behind starts missing messages instead of stalling the room.
pub const MEMBER_QUEUE_CAPACITY: usize = 256;

pub type MemberSender = mpsc::Sender<ServerMessage>;
pub type MemberReceiver = mpsc::Receiver<ServerMessage>;

/// Outbound queue for one member
pub fn member_channel() -> (MemberSender, MemberReceiver) {
    mpsc::channel(MEMBER_QUEUE_CAPACITY)
}

#[derive(Debug, Default)]
pub struct RoomBroadcaster {
    rooms: DashMap<RoomId, HashMap<SessionId, MemberSender>>,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Returns false (and changes nothing) if the
    /// session is already a member.
    pub fn join(&self, room: &RoomId, session: &SessionId, tx: MemberSender) -> bool {
        let mut members = self.rooms.entry(room.clone()).or_default();
        if members.contains_key(session) {
            return false;
        }
        members.insert(session.clone(), tx);
        tracing::debug!(room = %room, session = %session, members = members.len(), "Joined room");
        true
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    /// Empty rooms are dropped.
    pub fn leave(&self, room: &RoomId, session: &SessionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(session).is_some(),
            None => false,
        };
        self.rooms.remove_if(room, |_, members| members.is_empty());

        if removed {
            tracing::debug!(room = %room, session = %session, "Left room");
        }
        removed
    }

    /// Deliver a message to every member of the room at call time, except
    /// `exclude`. Returns how many members accepted it.
    ///
    /// Members whose connection is gone or whose queue is full are skipped.
    pub fn broadcast(
        &self,
        room: &RoomId,
        message: ServerMessage,
        exclude: Option<&SessionId>,
    ) -> usize {
        let targets: Vec<(SessionId, MemberSender)> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|(session, _)| Some(*session) != exclude)
                .map(|(session, tx)| (session.clone(), tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (session, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(room = %room, session = %session, "Member queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(room = %room, session = %session, "Member already disconnected");
                }
            }
        }
        delivered
    }

    /// Whether the room currently has any members
    pub fn has_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
