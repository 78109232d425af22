//! Relay plumbing.
//!
//! The relay is a publish/subscribe channel keyed by room code: it forwards
//! each event to every other party that joined the event's room. Sessions
//! never talk to a transport directly; they hold a [`RelayLink`], which is a
//! duplex of outbound events and inbound events, whatever carries them.
//!
//! - [`hub`] - room registry and forwarding rules, shared by every relay
//! - [`memory`] - in-process relay (tests, embedding)
//! - [`ws`] - WebSocket client transport (feature `ws`)
//! - [`server`] - WebSocket relay server (feature `ws`)

pub mod event;
pub mod hub;
pub mod memory;
#[cfg(feature = "ws")]
pub mod server;
#[cfg(feature = "ws")]
pub mod ws;

pub use event::{ChunkBytes, FileChunk, RelayEvent, SendFileComplete};
pub use hub::{ClientId, RelayHub};
pub use memory::MemoryRelay;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::code::RoomCode;
use crate::error::{Error, Result};

/// Capacity of the outbound event queue of one link.
///
/// Bounded so a sender that outruns its transport is held back instead of
/// buffering the whole payload in memory.
pub const OUTBOUND_QUEUE: usize = 16;

/// Cloneable handle for emitting events onto a relay link.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelaySender {
    /// Wrap the outbound half of a transport.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for queue space if the transport is behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the transport has shut down.
    pub async fn emit(&self, event: RelayEvent) -> Result<()> {
        tracing::trace!("emit {} for room {}", event.name(), event.room_id());
        self.tx.send(event).await.map_err(|_| Error::RelayClosed)
    }

    /// Emit an event unless `cancel` fires before queue space is available.
    ///
    /// The flag is checked after the slot is reserved, immediately before the
    /// event is handed to the transport. Returns `false` if suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the transport has shut down.
    pub async fn emit_unless_cancelled(
        &self,
        event: RelayEvent,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let permit = self.tx.reserve().await.map_err(|_| Error::RelayClosed)?;
        if cancel.is_cancelled() {
            tracing::debug!("Suppressed {} after cancel", event.name());
            return Ok(false);
        }
        tracing::trace!("emit {} for room {}", event.name(), event.room_id());
        permit.send(event);
        Ok(true)
    }

    /// Emit an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the transport has shut down.
    pub fn try_emit(&self, event: RelayEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(ev) => {
                Error::Internal(format!("relay queue full, dropped {}", ev.name()))
            }
            mpsc::error::TrySendError::Closed(_) => Error::RelayClosed,
        })
    }

    /// Whether the transport behind this sender has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A connected duplex to a relay.
#[derive(Debug)]
pub struct RelayLink {
    sender: RelaySender,
    inbound: mpsc::UnboundedReceiver<RelayEvent>,
}

impl RelayLink {
    /// Assemble a link from its two halves.
    #[must_use]
    pub const fn new(sender: RelaySender, inbound: mpsc::UnboundedReceiver<RelayEvent>) -> Self {
        Self { sender, inbound }
    }

    /// A cloneable handle to the outbound half.
    #[must_use]
    pub fn sender(&self) -> RelaySender {
        self.sender.clone()
    }

    /// Emit an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the transport has shut down.
    pub async fn emit(&self, event: RelayEvent) -> Result<()> {
        self.sender.emit(event).await
    }

    /// Wait for the next inbound event. `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        self.inbound.recv().await
    }

    /// Take the next inbound event if one is already queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the transport is gone and nothing is
    /// left to read.
    pub fn try_recv(&mut self) -> Result<Option<RelayEvent>> {
        match self.inbound.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::RelayClosed),
        }
    }

    /// Join a room. The subscription is released when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the transport has shut down.
    pub async fn join(&self, room: &RoomCode) -> Result<RoomMembership> {
        self.emit(RelayEvent::JoinRoom(room.clone())).await?;
        tracing::debug!("Joined room {}", room);
        Ok(RoomMembership {
            sender: self.sender(),
            room: room.clone(),
        })
    }
}

/// Scoped room subscription.
///
/// Emits `leave-room` when dropped, so a session's subscription is released
/// on every exit path: completion, cancellation, error or plain drop.
#[derive(Debug)]
pub struct RoomMembership {
    sender: RelaySender,
    room: RoomCode,
}

impl RoomMembership {
    /// The joined room.
    #[must_use]
    pub const fn room(&self) -> &RoomCode {
        &self.room
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        if self.sender.is_closed() {
            return;
        }
        if let Err(e) = self.sender.try_emit(RelayEvent::LeaveRoom(self.room.clone())) {
            tracing::debug!("Could not leave room {}: {}", self.room, e);
        } else {
            tracing::debug!("Left room {}", self.room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_pair() -> (
        RelayLink,
        mpsc::Receiver<RelayEvent>,
        mpsc::UnboundedSender<RelayEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (RelayLink::new(RelaySender::new(out_tx), in_rx), out_rx, in_tx)
    }

    #[tokio::test]
    async fn test_membership_emits_join_and_leave() {
        let (link, mut out_rx, _in_tx) = link_pair();
        let room = RoomCode::parse("111111").expect("code");

        let membership = link.join(&room).await.expect("join");
        assert_eq!(membership.room(), &room);
        assert_eq!(out_rx.recv().await, Some(RelayEvent::JoinRoom(room.clone())));

        drop(membership);
        assert_eq!(out_rx.recv().await, Some(RelayEvent::LeaveRoom(room)));
    }

    #[tokio::test]
    async fn test_try_recv_reports_closed() {
        let (mut link, _out_rx, in_tx) = link_pair();
        let room = RoomCode::parse("222222").expect("code");

        assert!(link.try_recv().expect("open").is_none());
        in_tx
            .send(RelayEvent::ReceiverReady(room.clone()))
            .expect("send");
        drop(in_tx);

        assert_eq!(
            link.try_recv().expect("queued"),
            Some(RelayEvent::ReceiverReady(room))
        );
        assert!(matches!(link.try_recv(), Err(Error::RelayClosed)));
    }

    #[tokio::test]
    async fn test_emit_after_close_fails() {
        let (link, out_rx, _in_tx) = link_pair();
        drop(out_rx);
        let room = RoomCode::parse("333333").expect("code");
        assert!(matches!(
            link.emit(RelayEvent::CancelTransfer(room)).await,
            Err(Error::RelayClosed)
        ));
    }
}
