//! Relay command implementation.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use relaydrop_core::relay::server::{RelayServer, RelayServerConfig};

use super::{with_hint, RelayArgs};

/// Run the relay command until Ctrl-C.
pub async fn run(args: RelayArgs) -> Result<()> {
    let config = super::load_config();
    let bind = args.bind.unwrap_or(config.relay.bind);

    let server = RelayServer::new(RelayServerConfig { bind });

    println!();
    println!("RelayDrop relay v{}", relaydrop_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
    println!("  Listening on ws://{}/ws", bind);
    println!("  Press Ctrl-C to stop.");
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down relay");
        }
        signal.cancel();
    });

    server.run(shutdown).await.map_err(with_hint)
}
