//! WebSocket relay server.
//!
//! Serves a [`RelayHub`] over WebSockets so two hosts that cannot reach each
//! other directly can still exchange events.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | /ws | WebSocket upgrade, one relay client per socket |
//! | GET | /health | Liveness probe, returns `ok` |

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::{RelayEvent, RelayHub};
use crate::error::Result;

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 9470;

/// Largest accepted WebSocket message (a base64 chunk plus envelope fits
/// comfortably).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RELAY_PORT)),
        }
    }
}

/// The relay server instance.
#[derive(Debug)]
pub struct RelayServer {
    config: RelayServerConfig,
    hub: RelayHub,
}

impl RelayServer {
    /// Create a relay server with a fresh hub.
    #[must_use]
    pub fn new(config: RelayServerConfig) -> Self {
        Self {
            config,
            hub: RelayHub::new(),
        }
    }

    /// Get the server configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    /// The hub shared by every socket.
    #[must_use]
    pub const fn hub(&self) -> &RelayHub {
        &self.hub
    }

    /// Bind and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind).await?;
        tracing::info!("Relay listening on {}", listener.local_addr()?);
        serve(listener, self.hub, shutdown).await
    }
}

/// Build the relay router over `hub`.
pub fn router(hub: RelayHub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(hub)
}

/// Serve the relay on an already-bound listener.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, hub: RelayHub, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    tracing::info!("Relay stopped");
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<RelayHub>) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: RelayHub) {
    let (id, mut deliveries) = hub.register().await;
    let (mut write, mut read) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = deliveries.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match RelayEvent::from_json(text.as_str()) {
                Ok(event) => hub.handle(id, event).await,
                Err(e) => tracing::warn!("Client {} sent malformed frame: {}", id, e),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    hub.disconnect(id).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::code::RoomCode;
    use crate::relay::ws;

    #[tokio::test]
    async fn test_relay_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hub = RelayHub::new();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, hub.clone(), shutdown.clone()));

        let url = format!("ws://{addr}/ws");
        let mut sender = ws::connect(&url).await.expect("connect sender");
        let receiver = ws::connect(&url).await.expect("connect receiver");

        let room = RoomCode::parse("707070").expect("code");
        let _s = sender.join(&room).await.expect("join");
        let _r = receiver.join(&room).await.expect("join");
        while hub.room_size(&room).await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        receiver
            .emit(RelayEvent::ReceiverReady(room.clone()))
            .await
            .expect("emit");

        let event = tokio::time::timeout(Duration::from_secs(2), sender.recv())
            .await
            .expect("timely")
            .expect("event");
        assert_eq!(event, RelayEvent::ReceiverReady(room));

        shutdown.cancel();
        drop(sender);
        drop(receiver);
        let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
    }
}
