//! In-process relay.
//!
//! Each connected link gets a pump task that feeds its outbound events into a
//! shared [`RelayHub`]. Dropping every handle to a link's outbound half ends
//! the pump and disconnects the client from all rooms.

use tokio::sync::mpsc;

use super::{RelayHub, RelayLink, RelaySender, OUTBOUND_QUEUE};

/// A relay living in the current process.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    hub: RelayHub,
}

impl MemoryRelay {
    /// Create a relay with a fresh hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a relay over an existing hub.
    #[must_use]
    pub const fn with_hub(hub: RelayHub) -> Self {
        Self { hub }
    }

    /// The hub behind this relay.
    #[must_use]
    pub const fn hub(&self) -> &RelayHub {
        &self.hub
    }

    /// Connect a new client.
    pub async fn connect(&self) -> RelayLink {
        let (id, inbound) = self.hub.register().await;
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE);

        let hub = self.hub.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                hub.handle(id, event).await;
            }
            hub.disconnect(id).await;
        });

        RelayLink::new(RelaySender::new(tx), inbound)
    }
}
