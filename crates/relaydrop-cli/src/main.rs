//! RelayDrop CLI - send files through a relay with a 6-digit room code
//!
//! The sender gets a room code (also shown as a link and a QR code); the
//! receiver types it in and the file streams through the relay.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run a relay somewhere both hosts can reach
//! relaydrop relay --bind 0.0.0.0:9470
//!
//! # Send files
//! relaydrop send ./report.pdf --relay ws://relay.example.com:9470/ws
//!
//! # Receive them (on another host)
//! relaydrop receive 482913 --relay ws://relay.example.com:9470/ws
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Relay(args) => commands::relay::run(args).await,
        Command::Config(args) => commands::config::run(args),
        Command::Completions(args) => {
            commands::completions::run(args.shell);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,relaydrop=debug,relaydrop_core=debug"
    } else {
        "warn,relaydrop=info,relaydrop_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
