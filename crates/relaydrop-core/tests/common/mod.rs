//! Common test utilities for `RelayDrop` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use relaydrop_core::code::RoomCode;
use relaydrop_core::payload::NamedBlob;
use relaydrop_core::reassembly::CompletionPolicy;
use relaydrop_core::relay::{MemoryRelay, RelayHub};
use relaydrop_core::session::{ReceiverSession, SenderSession};

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Wait until at least `members` clients joined `room`.
pub async fn wait_for_room(hub: &RelayHub, room: &RoomCode, members: usize) {
    while hub.room_size(room).await < members {
        tokio::task::yield_now().await;
    }
}

/// Start a sender for `files` and join a receiver to its room.
///
/// Both sessions are ready to `run`.
pub async fn start_pair(
    relay: &MemoryRelay,
    files: Vec<NamedBlob>,
    policy: CompletionPolicy,
) -> (SenderSession, ReceiverSession, RoomCode) {
    let mut sender = SenderSession::new(relay.connect().await, files);
    let code = sender.start().await.expect("sender start");
    wait_for_room(relay.hub(), &code, 1).await;

    let mut receiver = ReceiverSession::new(relay.connect().await, policy);
    receiver.join(code.as_str()).await.expect("receiver join");
    wait_for_room(relay.hub(), &code, 2).await;

    (sender, receiver, code)
}
