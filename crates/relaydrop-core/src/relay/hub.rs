//! Room registry and forwarding rules.
//!
//! A hub tracks which clients joined which rooms and forwards every
//! non-membership event to all *other* members of the event's room. The
//! emitting client never receives its own events. Both the in-process relay
//! and the WebSocket relay server are thin transports over one hub.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::code::RoomCode;
use crate::relay::RelayEvent;

/// Identifier of one connected client.
pub type ClientId = Uuid;

#[derive(Debug, Default)]
struct HubState {
    clients: HashMap<ClientId, mpsc::UnboundedSender<RelayEvent>>,
    rooms: HashMap<RoomCode, HashSet<ClientId>>,
}

impl HubState {
    fn leave(&mut self, id: ClientId, room: &RoomCode) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// Shared room registry.
#[derive(Debug, Clone, Default)]
pub struct RelayHub {
    state: Arc<Mutex<HubState>>,
}

impl RelayHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and get the stream of events delivered to it.
    pub async fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<RelayEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.clients.insert(id, tx);
        tracing::debug!("Relay client {} connected", id);
        (id, rx)
    }

    /// Apply one event emitted by `from`.
    pub async fn handle(&self, from: ClientId, event: RelayEvent) {
        let mut state = self.state.lock().await;

        match event {
            RelayEvent::JoinRoom(room) => {
                tracing::debug!("Client {} joined room {}", from, room);
                state.rooms.entry(room).or_default().insert(from);
            }
            RelayEvent::LeaveRoom(room) => {
                tracing::debug!("Client {} left room {}", from, room);
                state.leave(from, &room);
            }
            event => {
                let room = event.room_id();
                let Some(members) = state.rooms.get(room) else {
                    tracing::warn!("Dropping {} for empty room {}", event.name(), room);
                    return;
                };
                if !members.contains(&from) {
                    tracing::warn!(
                        "Dropping {} from client {} not in room {}",
                        event.name(),
                        from,
                        room
                    );
                    return;
                }

                let targets: Vec<ClientId> =
                    members.iter().copied().filter(|id| *id != from).collect();
                for target in targets {
                    if let Some(tx) = state.clients.get(&target) {
                        if tx.send(event.clone()).is_err() {
                            tracing::debug!("Client {} went away, skipping", target);
                        }
                    }
                }
            }
        }
    }

    /// Remove a client from every room it joined.
    pub async fn disconnect(&self, id: ClientId) {
        let mut state = self.state.lock().await;
        state.clients.remove(&id);
        let joined: Vec<RoomCode> = state
            .rooms
            .iter()
            .filter(|(_, members)| members.contains(&id))
            .map(|(room, _)| room.clone())
            .collect();
        for room in &joined {
            state.leave(id, room);
        }
        tracing::debug!("Relay client {} disconnected", id);
    }

    /// Number of clients currently in `room`.
    pub async fn room_size(&self, room: &RoomCode) -> usize {
        self.state
            .lock()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomCode {
        RoomCode::parse(code).expect("valid code")
    }

    #[tokio::test]
    async fn test_forwards_to_other_members_only() {
        let hub = RelayHub::new();
        let (a, mut a_rx) = hub.register().await;
        let (b, mut b_rx) = hub.register().await;

        hub.handle(a, RelayEvent::JoinRoom(room("100001"))).await;
        hub.handle(b, RelayEvent::JoinRoom(room("100001"))).await;
        hub.handle(b, RelayEvent::ReceiverReady(room("100001"))).await;

        assert_eq!(
            a_rx.try_recv().expect("delivered"),
            RelayEvent::ReceiverReady(room("100001"))
        );
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = RelayHub::new();
        let (a, _a_rx) = hub.register().await;
        let (b, mut b_rx) = hub.register().await;

        hub.handle(a, RelayEvent::JoinRoom(room("100001"))).await;
        hub.handle(b, RelayEvent::JoinRoom(room("200002"))).await;
        hub.handle(a, RelayEvent::CancelTransfer(room("100001"))).await;

        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_member_cannot_emit() {
        let hub = RelayHub::new();
        let (a, mut a_rx) = hub.register().await;
        let (b, _b_rx) = hub.register().await;

        hub.handle(a, RelayEvent::JoinRoom(room("100001"))).await;
        hub.handle(b, RelayEvent::CancelTransfer(room("100001"))).await;

        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_and_disconnect_release_rooms() {
        let hub = RelayHub::new();
        let (a, _a_rx) = hub.register().await;
        let (b, _b_rx) = hub.register().await;

        hub.handle(a, RelayEvent::JoinRoom(room("100001"))).await;
        hub.handle(b, RelayEvent::JoinRoom(room("100001"))).await;
        assert_eq!(hub.room_size(&room("100001")).await, 2);

        hub.handle(a, RelayEvent::LeaveRoom(room("100001"))).await;
        assert_eq!(hub.room_size(&room("100001")).await, 1);

        hub.disconnect(b).await;
        assert_eq!(hub.room_size(&room("100001")).await, 0);
        assert_eq!(hub.client_count().await, 1);
    }
}
