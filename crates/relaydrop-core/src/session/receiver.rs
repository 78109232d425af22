//! Receiver side of a transfer.

use tokio_util::sync::CancellationToken;

use super::{CancelSource, SessionPhase, SessionSnapshot, SessionState};
use crate::code::RoomCode;
use crate::error::{Error, Result};
use crate::reassembly::{ChunkReassembler, CompletionOutcome, CompletionPolicy, DeliveredPayload};
use crate::relay::{RelayEvent, RelayLink, RelaySender, RoomMembership};

/// How a receive ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The payload was reassembled
    Delivered(DeliveredPayload),
    /// The completion marker arrived with gaps and the strict policy refused it
    Incomplete {
        /// Payload name
        name: String,
        /// Lowest indices that never arrived
        missing: Vec<u64>,
        /// Number of indices that never arrived
        missing_count: u64,
    },
    /// The transfer was canceled
    Canceled(CancelSource),
}

/// A receive session.
///
/// The same session can receive several payloads one after another: after a
/// delivery it is idle again and [`join`](Self::join) may be called with a
/// new code.
#[derive(Debug)]
pub struct ReceiverSession {
    link: RelayLink,
    reassembler: ChunkReassembler,
    membership: Option<RoomMembership>,
    cancel: CancellationToken,
    state: SessionState,
}

impl ReceiverSession {
    /// Create an idle session.
    #[must_use]
    pub fn new(link: RelayLink, policy: CompletionPolicy) -> Self {
        Self {
            link,
            reassembler: ChunkReassembler::new(policy),
            membership: None,
            cancel: CancellationToken::new(),
            state: SessionState::new("Receiver"),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Follow state changes.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// The reassembly buffer of the current transfer.
    #[must_use]
    pub const fn reassembler(&self) -> &ChunkReassembler {
        &self.reassembler
    }

    /// A handle that can cancel the current transfer from another task.
    ///
    /// The handle is bound to the join it was taken after.
    #[must_use]
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            sender: self.link.sender(),
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        }
    }

    /// Join the room named by `code` and tell the sender to start.
    ///
    /// The code is validated locally first; a malformed code never reaches
    /// the relay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodeFormat`] for anything but six digits,
    /// [`Error::InvalidPhase`] while a transfer is in progress, or
    /// [`Error::RelayClosed`] if the relay is gone.
    pub async fn join(&mut self, code: &str) -> Result<RoomCode> {
        let room = RoomCode::parse(code)?;

        let phase = self.phase();
        if phase.is_active() {
            return Err(Error::InvalidPhase {
                operation: "join",
                phase: phase.to_string(),
            });
        }

        self.membership = None;
        self.reassembler.reset();
        self.cancel = CancellationToken::new();
        self.state.restart(SessionPhase::Idle, Some(room.clone()));

        self.membership = Some(self.link.join(&room).await?);
        self.link
            .emit(RelayEvent::ReceiverReady(room.clone()))
            .await?;
        self.state.advance(SessionPhase::AwaitingPeer);
        tracing::info!("Waiting for chunks in room {}", room);
        Ok(room)
    }

    /// Apply one inbound event.
    ///
    /// Returns an outcome once the transfer ends. Events for other rooms, and
    /// events arriving while not joined, are ignored. Once a
    /// [`ReceiverHandle`] canceled the transfer, any event ends it as
    /// canceled and nothing is delivered.
    pub fn handle_event(&mut self, event: RelayEvent) -> Option<ReceiveOutcome> {
        let room = self.membership.as_ref()?.room().clone();
        if event.room_id() != &room {
            tracing::debug!("Ignoring {} for room {}", event.name(), event.room_id());
            return None;
        }

        if self.cancel.is_cancelled() || self.phase().is_terminal() {
            tracing::debug!("Dropping {} after cancel", event.name());
            return Some(self.canceled(CancelSource::Local));
        }

        match event {
            RelayEvent::FileChunk(chunk) => {
                if self.phase() == SessionPhase::AwaitingPeer {
                    self.state.set_payload_name(&chunk.file_name);
                    self.state.advance(SessionPhase::Transferring);
                }
                if self.reassembler.on_chunk(chunk) {
                    self.state.set_progress(self.reassembler.progress());
                }
                None
            }
            RelayEvent::SendFileComplete(complete) => {
                let outcome = match self.reassembler.on_complete(&complete.file_name) {
                    CompletionOutcome::Delivered(payload) => {
                        tracing::info!(
                            "Received {} ({} bytes)",
                            payload.name,
                            payload.bytes.len()
                        );
                        self.state.set_payload_name(&payload.name);
                        self.state.set_progress(1.0);
                        self.state.advance(SessionPhase::Completed);
                        self.membership = None;
                        self.state.restart(SessionPhase::Idle, None);
                        ReceiveOutcome::Delivered(payload)
                    }
                    CompletionOutcome::Incomplete {
                        name,
                        missing,
                        missing_count,
                    } => {
                        self.state.advance(SessionPhase::Failed);
                        self.membership = None;
                        ReceiveOutcome::Incomplete {
                            name,
                            missing,
                            missing_count,
                        }
                    }
                    CompletionOutcome::Discarded => {
                        self.state.advance(SessionPhase::Canceled);
                        self.membership = None;
                        ReceiveOutcome::Canceled(CancelSource::Local)
                    }
                };
                Some(outcome)
            }
            RelayEvent::CancelTransfer(_) => {
                tracing::info!("Sender canceled the transfer");
                Some(self.canceled(CancelSource::Peer))
            }
            other => {
                tracing::debug!("Ignoring {} while receiving", other.name());
                None
            }
        }
    }

    /// Process inbound events until the transfer ends.
    ///
    /// There is no timeout: a room nobody sends to keeps the session waiting
    /// until it is canceled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] if not joined, or
    /// [`Error::RelayClosed`] if the relay goes away (the session is then
    /// failed).
    pub async fn run(&mut self) -> Result<ReceiveOutcome> {
        let phase = self.phase();
        if phase == SessionPhase::Canceled && self.membership.is_some() {
            return Ok(self.canceled(CancelSource::Local));
        }
        if !matches!(phase, SessionPhase::AwaitingPeer | SessionPhase::Transferring) {
            return Err(Error::InvalidPhase {
                operation: "run",
                phase: phase.to_string(),
            });
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Ok(self.canceled(CancelSource::Local));
                }
                event = self.link.recv() => {
                    let Some(event) = event else {
                        tracing::error!("Relay closed while receiving");
                        self.reassembler.on_cancel();
                        self.membership = None;
                        self.state.advance(SessionPhase::Failed);
                        return Err(Error::RelayClosed);
                    };
                    if let Some(outcome) = self.handle_event(event) {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    /// Cancel the current transfer. See [`ReceiverHandle::cancel`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the cancel could not be emitted.
    pub async fn cancel(&mut self) -> Result<bool> {
        let canceled = self.handle().cancel().await?;
        if canceled {
            self.canceled(CancelSource::Local);
        }
        Ok(canceled)
    }

    fn canceled(&mut self, source: CancelSource) -> ReceiveOutcome {
        self.reassembler.on_cancel();
        self.state.advance(SessionPhase::Canceled);
        self.membership = None;
        ReceiveOutcome::Canceled(source)
    }
}

/// Cancels a [`ReceiverSession`] from another task.
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    sender: RelaySender,
    cancel: CancellationToken,
    state: SessionState,
}

impl ReceiverHandle {
    /// Cancel the transfer.
    ///
    /// Forces the session to `Canceled`, raises the cancel flag so buffered
    /// chunks are discarded, and emits `cancel-transfer` so the sender stops.
    /// Returns `false` if no transfer was in progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the cancel could not be emitted.
    pub async fn cancel(&self) -> Result<bool> {
        if !self.state.phase().is_active() || !self.state.advance(SessionPhase::Canceled) {
            return Ok(false);
        }
        self.cancel.cancel();

        if let Some(room) = self.state.room() {
            self.sender.emit(RelayEvent::CancelTransfer(room)).await?;
        }
        Ok(true)
    }

    /// Current snapshot of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }
}
