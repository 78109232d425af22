//! WebSocket client transport.
//!
//! Connects to a relay server and exposes it as a [`RelayLink`]. One task
//! writes outbound events as JSON text frames, another decodes inbound text
//! frames into events. When the socket closes the inbound stream ends, which
//! sessions observe as a closed relay.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::{RelayEvent, RelayLink, RelaySender, OUTBOUND_QUEUE};
use crate::error::{Error, Result};

/// Connect to the relay at `url` (e.g. `ws://localhost:9470/ws`).
///
/// # Errors
///
/// Returns [`Error::RelayUnreachable`] if the WebSocket handshake fails.
pub async fn connect(url: &str) -> Result<RelayLink> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::RelayUnreachable {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!("Connected to relay {}", url);

    let (mut write, mut read) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<RelayEvent>(OUTBOUND_QUEUE);
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::text(text)).await {
                tracing::warn!("Relay write failed: {}", e);
                break;
            }
        }
        let _ = write.send(Message::Close(None)).await;
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match RelayEvent::from_json(text.as_str()) {
                    Ok(event) => {
                        if in_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring malformed relay frame: {}", e),
                },
                Ok(Message::Close(_)) => {
                    tracing::debug!("Relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Relay read failed: {}", e);
                    break;
                }
            }
        }
    });

    Ok(RelayLink::new(RelaySender::new(out_tx), in_rx))
}
