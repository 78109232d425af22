//! Transfer sessions.
//!
//! A session owns everything one transfer needs: the relay link, the room
//! subscription, the payload or reassembly buffer, and the cancellation flag.
//! Nothing is shared between sessions.
//!
//! ## Phases
//!
//! ```text
//! Sender:   Idle -> AwaitingCode -> AwaitingPeer -> Transferring -> Completed
//! Receiver: Idle -> AwaitingPeer -> Transferring -> Completed -> Idle
//! ```
//!
//! Any non-terminal phase may move to `Canceled`. `Failed` covers local
//! faults such as an unreadable payload or a relay link that went away.
//! Observers follow a session through [`SessionSnapshot`]s on a watch
//! channel.

pub mod receiver;
pub mod sender;

pub use receiver::{ReceiveOutcome, ReceiverHandle, ReceiverSession};
pub use sender::{SendOutcome, SenderHandle, SenderSession};

use std::sync::Arc;

use tokio::sync::watch;

use crate::code::RoomCode;

/// Phase of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing in progress
    #[default]
    Idle,
    /// Sender generated a code and is preparing the room
    AwaitingCode,
    /// Joined the room, waiting for the other party
    AwaitingPeer,
    /// Chunks are flowing
    Transferring,
    /// The payload was sent or delivered
    Completed,
    /// The transfer was canceled by either party
    Canceled,
    /// A local fault ended the transfer
    Failed,
}

impl SessionPhase {
    /// Whether this phase ends the transfer of the current payload.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }

    /// Whether a transfer is underway (cancel is meaningful).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::AwaitingCode | Self::AwaitingPeer | Self::Transferring
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingCode => "awaiting code",
            Self::AwaitingPeer => "awaiting peer",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Who canceled a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// This side requested it
    Local,
    /// The other party sent `cancel-transfer`
    Peer,
}

/// Observable state of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Current phase
    pub phase: SessionPhase,
    /// Fraction of the payload transferred, 0.0 to 1.0
    pub progress: f64,
    /// Name of the payload, once known
    pub payload_name: Option<String>,
    /// Room of the current transfer, once known
    pub room: Option<RoomCode>,
}

/// Shared, observable session state.
///
/// Terminal phases are sticky: [`SessionState::advance`] refuses to leave
/// them, so a late completion cannot overwrite a cancel and vice versa.
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    role: &'static str,
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionState {
    pub(crate) fn new(role: &'static str) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            role,
            tx: Arc::new(tx),
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.tx.borrow().phase
    }

    pub(crate) fn room(&self) -> Option<RoomCode> {
        self.tx.borrow().room.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Move to `phase` unless the session already reached a terminal phase.
    pub(crate) fn advance(&self, phase: SessionPhase) -> bool {
        let role = self.role;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.phase.is_terminal() || snapshot.phase == phase {
                return false;
            }
            tracing::info!("{} session: {} -> {}", role, snapshot.phase, phase);
            snapshot.phase = phase;
            if phase.is_terminal() && phase != SessionPhase::Completed {
                snapshot.progress = 0.0;
            }
            true
        })
    }

    /// Start over in `phase`, clearing progress, name and room.
    pub(crate) fn restart(&self, phase: SessionPhase, room: Option<RoomCode>) {
        let role = self.role;
        self.tx.send_modify(|snapshot| {
            tracing::debug!("{} session: {} -> {} (reset)", role, snapshot.phase, phase);
            *snapshot = SessionSnapshot {
                phase,
                progress: 0.0,
                payload_name: None,
                room,
            };
        });
    }

    pub(crate) fn set_progress(&self, progress: f64) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.phase.is_terminal() {
                return false;
            }
            snapshot.progress = progress;
            true
        });
    }

    pub(crate) fn set_payload_name(&self, name: &str) {
        self.tx.send_modify(|snapshot| {
            snapshot.payload_name = Some(name.to_string());
        });
    }

    pub(crate) fn set_room(&self, room: &RoomCode) {
        self.tx.send_modify(|snapshot| {
            snapshot.room = Some(room.clone());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Canceled.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
        assert!(!SessionPhase::Idle.is_terminal());
        assert!(!SessionPhase::Transferring.is_terminal());
        assert!(SessionPhase::AwaitingCode.is_active());
        assert!(!SessionPhase::Idle.is_active());
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        let state = SessionState::new("test");
        assert!(state.advance(SessionPhase::Transferring));
        state.set_progress(0.5);
        assert!(state.advance(SessionPhase::Canceled));

        assert!(!state.advance(SessionPhase::Completed));
        assert_eq!(state.phase(), SessionPhase::Canceled);
        assert!(state.snapshot().progress.abs() < f64::EPSILON);

        state.set_progress(0.9);
        assert!(state.snapshot().progress.abs() < f64::EPSILON);
    }

    #[test]
    fn test_restart_clears_snapshot() {
        let state = SessionState::new("test");
        let room = RoomCode::parse("102030").expect("code");
        state.set_room(&room);
        state.set_payload_name("a.txt");
        state.advance(SessionPhase::Completed);

        state.restart(SessionPhase::Idle, None);
        assert_eq!(state.snapshot(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let state = SessionState::new("test");
        let mut rx = state.subscribe();
        state.advance(SessionPhase::AwaitingPeer);
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow().phase, SessionPhase::AwaitingPeer);
    }
}
