//! # RelayDrop Core Library
//!
//! `relaydrop-core` moves one file (or a zip of several) from a sender to a
//! receiver through a relay that forwards events between the parties of a
//! room. The room is named by a 6-digit code the receiver types in, follows
//! as a link, or scans as a QR code.
//!
//! ## Features
//!
//! - **Room codes**: Six digits, validated before anything reaches the relay
//! - **Bundling**: Several files travel as one `files-<code>.zip`
//! - **Chunked transfer**: Fixed 64 KiB chunks, one in flight at a time
//! - **Cancellation**: Either side can abort; partial buffers are discarded
//!
//! ## Modules
//!
//! - [`bundle`] - Turning a file selection into one payload
//! - [`chunk`] - Sender-side chunking engine
//! - [`code`] - Room code generation and validation
//! - [`config`] - Configuration management
//! - [`payload`] - Payload sources and file helpers
//! - [`qr`] - Share links and QR codes
//! - [`reassembly`] - Receiver-side reassembly
//! - [`relay`] - Relay event model, in-process relay, WebSocket transport
//! - [`session`] - Sender and receiver state machines
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaydrop_core::payload::NamedBlob;
//! use relaydrop_core::reassembly::CompletionPolicy;
//! use relaydrop_core::relay::MemoryRelay;
//! use relaydrop_core::session::{ReceiverSession, SenderSession};
//!
//! let relay = MemoryRelay::new();
//! let files = vec![NamedBlob::from_path("notes.txt".as_ref()).await?];
//!
//! let mut sender = SenderSession::new(relay.connect().await, files);
//! let code = sender.start().await?;
//!
//! let mut receiver = ReceiverSession::new(relay.connect().await, CompletionPolicy::default());
//! receiver.join(code.as_str()).await?;
//!
//! let (sent, received) = tokio::join!(sender.run(), receiver.run());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod bundle;
pub mod chunk;
pub mod code;
pub mod config;
pub mod error;
pub mod payload;
pub mod qr;
pub mod reassembly;
pub mod relay;
pub mod session;

pub use code::RoomCode;
pub use error::{Error, Result};
pub use payload::{NamedBlob, Payload};
pub use reassembly::{CompletionPolicy, DeliveredPayload};
pub use session::{
    ReceiveOutcome, ReceiverSession, SendOutcome, SenderSession, SessionPhase, SessionSnapshot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
