//! Outbound message routing to connected clients

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::Room;
use crate::ws::protocol::ServerMsg;

/// Per-connection outbound queue depth
pub const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Registry of per-connection outbound queues.
///
/// Sends never block: a full queue drops the message for that connection
/// only. The writer task of each socket drains its queue.
pub struct Outbox {
    connections: DashMap<Uuid, mpsc::Sender<ServerMsg>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection and return the receiving end of its queue
    pub fn register(&self, connection_id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        self.connections.insert(connection_id, tx);
        rx
    }

    pub fn unregister(&self, connection_id: &Uuid) {
        self.connections.remove(connection_id);
    }

    /// Send to a single connection
    pub fn send_to(&self, connection_id: &Uuid, msg: ServerMsg) {
        let Some(tx) = self.connections.get(connection_id) else {
            debug!(connection_id = %connection_id, "Dropping message for unknown connection");
            return;
        };

        match tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %connection_id, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %connection_id, "Outbound queue closed");
            }
        }
    }

    /// Send to every current member of a room
    pub fn send_to_room(&self, room: &Room, msg: ServerMsg) {
        for player in &room.players {
            self.send_to(&player.id, msg.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}
