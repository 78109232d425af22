//! Sender side of a transfer.

use tokio_util::sync::CancellationToken;

use super::{CancelSource, SessionPhase, SessionSnapshot, SessionState};
use crate::bundle;
use crate::chunk::{Advance, ChunkEncoder, EncoderOutcome};
use crate::code::RoomCode;
use crate::error::{Error, Result};
use crate::payload::{NamedBlob, Payload};
use crate::relay::{RelayEvent, RelayLink, RelaySender, RoomMembership};

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every chunk and the completion marker were emitted
    Completed {
        /// Name the payload was sent under
        payload_name: String,
        /// Chunks emitted
        chunks: u64,
    },
    /// The transfer was canceled
    Canceled(CancelSource),
}

/// A send session.
///
/// ```rust,ignore
/// let mut session = SenderSession::new(relay.connect().await, files);
/// let code = session.start().await?;
/// println!("Code: {code}");
/// let outcome = session.run().await?;
/// ```
#[derive(Debug)]
pub struct SenderSession {
    link: RelayLink,
    files: Vec<NamedBlob>,
    payload: Option<Payload>,
    membership: Option<RoomMembership>,
    cancel: CancellationToken,
    state: SessionState,
}

impl SenderSession {
    /// Create an idle session for `files`.
    #[must_use]
    pub fn new(link: RelayLink, files: Vec<NamedBlob>) -> Self {
        Self {
            link,
            files,
            payload: None,
            membership: None,
            cancel: CancellationToken::new(),
            state: SessionState::new("Sender"),
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

    /// The room code, once generated.
    #[must_use]
    pub fn code(&self) -> Option<RoomCode> {
        self.state.room()
    }

    /// The payload being sent, once bundled.
    #[must_use]
    pub const fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// A handle that can cancel this session from another task.
    #[must_use]
    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            sender: self.link.sender(),
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        }
    }

    /// Generate a room code, bundle the files and join the room.
    ///
    /// On success the session is waiting for a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFiles`] if nothing was selected (the session stays
    /// idle), [`Error::InvalidPhase`] if the session was already started, or
    /// an error if bundling or joining fails (the session is then failed).
    pub async fn start(&mut self) -> Result<RoomCode> {
        let phase = self.phase();
        if phase != SessionPhase::Idle {
            return Err(Error::InvalidPhase {
                operation: "start",
                phase: phase.to_string(),
            });
        }
        if self.files.is_empty() {
            return Err(Error::NoFiles);
        }

        let code = RoomCode::generate();
        self.state.set_room(&code);
        self.state.advance(SessionPhase::AwaitingCode);

        match self.prepare(&code).await {
            Ok(()) => {
                self.state.advance(SessionPhase::AwaitingPeer);
                Ok(code)
            }
            Err(e) => {
                tracing::error!("Failed to start send: {}", e);
                self.state.advance(SessionPhase::Failed);
                Err(e)
            }
        }
    }

    async fn prepare(&mut self, code: &RoomCode) -> Result<()> {
        let files = std::mem::take(&mut self.files);
        let payload = bundle::decide(files, code).await?;
        tracing::info!(
            "Prepared {} ({} bytes) for room {}",
            payload.name(),
            payload.byte_length(),
            code
        );
        self.state.set_payload_name(payload.name());
        self.payload = Some(payload);

        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.membership = Some(self.link.join(code).await?);
        Ok(())
    }

    /// Wait for the receiver, then stream the payload.
    ///
    /// Returns when every chunk and the completion marker are out, or when
    /// either side cancels. The room is left on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] if [`start`](Self::start) did not
    /// succeed, or an error if the payload cannot be read or the relay goes
    /// away (the session is then failed).
    pub async fn run(&mut self) -> Result<SendOutcome> {
        let phase = self.phase();
        if phase == SessionPhase::Canceled {
            self.release();
            return Ok(SendOutcome::Canceled(CancelSource::Local));
        }
        if phase != SessionPhase::AwaitingPeer {
            return Err(Error::InvalidPhase {
                operation: "run",
                phase: phase.to_string(),
            });
        }

        let result = self.drive().await;
        if let Err(e) = &result {
            tracing::error!("Send failed: {}", e);
            self.state.advance(SessionPhase::Failed);
        }
        self.release();
        result
    }

    async fn drive(&mut self) -> Result<SendOutcome> {
        let Some(room) = self.state.room() else {
            return Err(Error::Internal("sender has no room".to_string()));
        };

        if let Some(source) = self.await_peer(&room).await? {
            return Ok(self.canceled(source));
        }
        if !self.state.advance(SessionPhase::Transferring) {
            return Ok(self.canceled(CancelSource::Local));
        }

        let Some(payload) = self.payload.clone() else {
            return Err(Error::Internal("sender has no payload".to_string()));
        };
        let payload_name = payload.name().to_string();
        let sender = self.link.sender();
        let mut encoder = ChunkEncoder::new(payload, room.clone(), self.cancel.clone());
        let mut peer_canceled = false;

        let outcome = loop {
            match self
                .advance_watching_peer(&mut encoder, &sender, &room, &mut peer_canceled)
                .await?
            {
                Advance::Sent { progress, .. } => self.state.set_progress(progress),
                Advance::Done(outcome) => break outcome,
            }
        };

        match outcome {
            EncoderOutcome::Completed { chunks } => {
                self.state.set_progress(1.0);
                if self.state.advance(SessionPhase::Completed) {
                    Ok(SendOutcome::Completed {
                        payload_name,
                        chunks,
                    })
                } else {
                    Ok(self.canceled(CancelSource::Local))
                }
            }
            EncoderOutcome::Aborted { .. } => {
                let source = if peer_canceled {
                    CancelSource::Peer
                } else {
                    CancelSource::Local
                };
                Ok(self.canceled(source))
            }
        }
    }

    /// Wait for `receiver-ready`. Returns who canceled, if anyone did.
    async fn await_peer(&mut self, room: &RoomCode) -> Result<Option<CancelSource>> {
        tracing::info!("Waiting for a receiver in room {}", room);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(Some(CancelSource::Local)),
                event = self.link.recv() => match event {
                    None => return Err(Error::RelayClosed),
                    Some(event) if event.room_id() != room => {
                        tracing::debug!("Ignoring {} for room {}", event.name(), event.room_id());
                    }
                    Some(RelayEvent::ReceiverReady(_)) => {
                        tracing::info!("Receiver ready in room {}", room);
                        return Ok(None);
                    }
                    Some(RelayEvent::CancelTransfer(_)) => {
                        self.cancel.cancel();
                        return Ok(Some(CancelSource::Peer));
                    }
                    Some(event) => tracing::debug!("Ignoring {} while waiting", event.name()),
                },
            }
        }
    }

    /// Advance the encoder by one step while listening for a peer cancel.
    ///
    /// The step future is polled to completion: an incoming cancel only
    /// raises the flag, which the encoder observes at its next check.
    async fn advance_watching_peer(
        &mut self,
        encoder: &mut ChunkEncoder,
        sender: &RelaySender,
        room: &RoomCode,
        peer_canceled: &mut bool,
    ) -> Result<Advance> {
        let step = encoder.advance(sender);
        tokio::pin!(step);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                biased;
                result = &mut step => return result,
                event = self.link.recv(), if inbound_open => match event {
                    None => {
                        tracing::debug!("Relay inbound closed during send");
                        inbound_open = false;
                    }
                    Some(RelayEvent::CancelTransfer(r)) if &r == room => {
                        tracing::info!("Receiver canceled the transfer");
                        *peer_canceled = true;
                        self.cancel.cancel();
                    }
                    Some(event) => tracing::debug!("Ignoring {} during send", event.name()),
                },
            }
        }
    }

    fn canceled(&mut self, source: CancelSource) -> SendOutcome {
        self.state.advance(SessionPhase::Canceled);
        self.payload = None;
        SendOutcome::Canceled(source)
    }

    fn release(&mut self) {
        self.membership = None;
    }

    /// Cancel the transfer. See [`SenderHandle::cancel`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::RelayClosed`] if the cancel could not be emitted.
    pub async fn cancel(&mut self) -> Result<bool> {
        let canceled = self.handle().cancel().await?;
        if canceled {
            self.payload = None;
            self.release();
        }
        Ok(canceled)
    }
}

/// Cancels a [`SenderSession`] from another task.
#[derive(Debug, Clone)]
pub struct SenderHandle {
    sender: RelaySender,
    cancel: CancellationToken,
    state: SessionState,
}

impl SenderHandle {
    /// Cancel the transfer.
    ///
    /// Forces the session to `Canceled` and clears its progress immediately,
    /// raises the cancel flag so no further chunk is read or emitted, and
    /// emits `cancel-transfer` to the room. Returns `false` if the session
    /// was not in a cancelable phase.
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
