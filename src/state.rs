use std::sync::Arc;

use crate::assistant::AssistantTrigger;
use crate::broadcast::RoomBroadcaster;
use crate::gate::ConnectionGate;
use crate::revocation::RevocationStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ConnectionGate>,
    pub broadcaster: Arc<RoomBroadcaster>,
    pub assistant: AssistantTrigger,
}

impl AppState {
    pub fn new(
        gate: ConnectionGate,
        broadcaster: Arc<RoomBroadcaster>,
        assistant: AssistantTrigger,
    ) -> Self {
        Self {
            gate: Arc::new(gate),
            broadcaster,
            assistant,
        }
    }

    /// The store logout writes to and the gate reads from
    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        self.gate.revocations()
    }
}
