//! CLI command definitions and handlers.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, it falls back to defaults.
pub fn load_config() -> relaydrop_core::config::Config {
    relaydrop_core::config::Config::load().unwrap_or_default()
}

/// Turn a core error into a CLI error, appending its hint if it has one.
pub fn with_hint(e: relaydrop_core::Error) -> anyhow::Error {
    match (e.code(), e.suggestion()) {
        (Some(code), Some(hint)) => anyhow::anyhow!("{e} [{code}]\n\n{hint}"),
        (Some(code), None) => anyhow::anyhow!("{e} [{code}]"),
        (None, Some(hint)) => anyhow::anyhow!("{e}\n\n{hint}"),
        (None, None) => anyhow::Error::new(e),
    }
}

/// Connect to the relay, preferring `url` over the configured one.
pub async fn connect_relay(
    url: Option<String>,
    config: &relaydrop_core::config::Config,
) -> anyhow::Result<relaydrop_core::relay::RelayLink> {
    let url = url.unwrap_or_else(|| config.relay.url.clone());
    relaydrop_core::relay::ws::connect(&url)
        .await
        .map_err(with_hint)
}

pub mod completions;
pub mod config;
pub mod receive;
pub mod relay;
pub mod send;

/// RelayDrop - send files through a relay with a 6-digit room code
#[derive(Parser)]
#[command(name = "relaydrop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send files; prints the room code for the receiver
    Send(SendArgs),

    /// Receive files using a room code or share link
    Receive(ReceiveArgs),

    /// Run a relay server
    Relay(RelayArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Files to send (several are bundled into one zip)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Relay WebSocket URL (overrides relay.url)
    #[arg(long, env = "RELAYDROP_RELAY")]
    pub relay: Option<String>,

    /// Don't print the QR code
    #[arg(long)]
    pub no_qr: bool,

    /// Minimal output: only the room code
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Room code (6 digits) or share link
    pub code: String,

    /// Output directory (overrides receive.output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Relay WebSocket URL (overrides relay.url)
    #[arg(long, env = "RELAYDROP_RELAY")]
    pub relay: Option<String>,

    /// Refuse payloads with missing chunks
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the relay command
#[derive(Parser)]
pub struct RelayArgs {
    /// Address to listen on (overrides relay.bind)
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key, e.g. relay.url
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Configuration key, e.g. relay.url
        key: String,
        /// New value
        value: String,
    },
    /// Show all configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Reset configuration to defaults
    Reset,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}
