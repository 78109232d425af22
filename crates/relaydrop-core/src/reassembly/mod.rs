//! Receiver-side reassembly of chunked payloads.
//!
//! Chunks may arrive in any order and may repeat; each is stored in the slot
//! named by its index (a later write to the same slot wins). The payload is
//! produced only when the sender's completion marker arrives. How strictly
//! that marker is trusted is a [`CompletionPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::relay::FileChunk;

/// Most missing indices listed in an outcome. The full count is always
/// reported separately.
pub const MAX_LISTED_MISSING: usize = 1024;

/// How a completion marker is honoured when some slots are still empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    /// Deliver whatever arrived. Missing slots contribute no bytes and are
    /// reported alongside the payload.
    #[default]
    Trusting,
    /// Deliver only when every slot is filled, otherwise discard.
    Strict,
}

impl std::fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trusting => write!(f, "trusting"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trusting" => Ok(Self::Trusting),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown completion policy '{other}'")),
        }
    }
}

/// A reassembled payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredPayload {
    /// Payload name
    pub name: String,
    /// Slots concatenated in index order
    pub bytes: Vec<u8>,
    /// Lowest indices that never arrived, at most [`MAX_LISTED_MISSING`]
    /// (always empty under [`CompletionPolicy::Strict`])
    pub missing_chunks: Vec<u64>,
    /// Number of indices that never arrived
    pub missing_count: u64,
}

impl DeliveredPayload {
    /// Whether every chunk arrived.
    #[must_use]
    pub const fn is_whole(&self) -> bool {
        self.missing_count == 0
    }
}

/// Result of [`ChunkReassembler::on_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The payload was produced
    Delivered(DeliveredPayload),
    /// Strict policy refused a payload with gaps; the buffer was discarded
    Incomplete {
        /// Payload name
        name: String,
        /// Lowest indices that never arrived, at most [`MAX_LISTED_MISSING`]
        missing: Vec<u64>,
        /// Number of indices that never arrived
        missing_count: u64,
    },
    /// The transfer was canceled; nothing is produced
    Discarded,
}

#[derive(Debug)]
struct Buffer {
    file_name: String,
    total_chunks: u64,
    slots: BTreeMap<u64, Vec<u8>>,
}

impl Buffer {
    /// Count of empty slots and the lowest of them.
    ///
    /// Every stored index is below `total_chunks`, so the scan stops after
    /// at most `slots.len() + MAX_LISTED_MISSING` steps whatever the peer
    /// announced.
    fn missing(&self) -> (u64, Vec<u64>) {
        let count = self.total_chunks - self.slots.len() as u64;
        if count == 0 {
            return (0, Vec::new());
        }
        let listed = (0..self.total_chunks)
            .filter(|i| !self.slots.contains_key(i))
            .take(MAX_LISTED_MISSING)
            .collect();
        (count, listed)
    }
}

/// Reassembly state for one incoming payload.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    policy: CompletionPolicy,
    buffer: Option<Buffer>,
    canceled: bool,
    progress: f64,
}

impl ChunkReassembler {
    /// Create a reassembler with the given completion policy.
    #[must_use]
    pub fn new(policy: CompletionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The completion policy.
    #[must_use]
    pub const fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Whether a buffer has been allocated (a first chunk arrived).
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Whether the transfer was canceled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Name recorded at the first chunk.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.buffer.as_ref().map(|b| b.file_name.as_str())
    }

    /// Slot count recorded at the first chunk.
    #[must_use]
    pub fn total_chunks(&self) -> Option<u64> {
        self.buffer.as_ref().map(|b| b.total_chunks)
    }

    /// Number of distinct slots filled.
    #[must_use]
    pub fn received_count(&self) -> u64 {
        self.buffer.as_ref().map_or(0, |b| b.slots.len() as u64)
    }

    /// `(chunk_index + 1) / total_chunks` of the latest stored chunk.
    #[must_use]
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    /// Store one chunk. Returns whether it was stored.
    ///
    /// Ignored after cancellation, when the chunk names another file than
    /// the first one, and when the index lies outside the slot count recorded
    /// at the first chunk.
    pub fn on_chunk(&mut self, chunk: FileChunk) -> bool {
        if self.canceled {
            tracing::debug!("Ignoring chunk {} after cancel", chunk.chunk_index);
            return false;
        }

        let buffer = self.buffer.get_or_insert_with(|| {
            tracing::debug!(
                "Receiving {} in {} chunks",
                chunk.file_name,
                chunk.total_chunks
            );
            Buffer {
                file_name: chunk.file_name.clone(),
                total_chunks: chunk.total_chunks,
                slots: BTreeMap::new(),
            }
        });

        if chunk.file_name != buffer.file_name {
            tracing::warn!(
                "Ignoring chunk {} of {} while receiving {}",
                chunk.chunk_index,
                chunk.file_name,
                buffer.file_name
            );
            return false;
        }

        if chunk.chunk_index >= buffer.total_chunks {
            tracing::warn!(
                "Ignoring chunk {} outside of {} slots",
                chunk.chunk_index,
                buffer.total_chunks
            );
            return false;
        }

        let index = chunk.chunk_index;
        if buffer
            .slots
            .insert(index, chunk.chunk.into_inner())
            .is_some()
        {
            tracing::debug!("Chunk {} received again, overwriting", index);
        }
        self.progress = (index + 1) as f64 / buffer.total_chunks as f64;
        true
    }

    /// Handle the sender's completion marker.
    ///
    /// Concatenates the slots in index order. The name recorded at the first
    /// chunk wins over `file_name`, which is only used when no chunk arrived
    /// (an empty payload). All state is cleared afterwards, so the reassembler
    /// is ready for a next payload.
    pub fn on_complete(&mut self, file_name: &str) -> CompletionOutcome {
        if self.canceled {
            self.clear();
            return CompletionOutcome::Discarded;
        }

        let Some(buffer) = self.buffer.take() else {
            self.progress = 0.0;
            return CompletionOutcome::Delivered(DeliveredPayload {
                name: file_name.to_string(),
                bytes: Vec::new(),
                missing_chunks: Vec::new(),
                missing_count: 0,
            });
        };
        self.progress = 0.0;

        let (missing_count, missing) = buffer.missing();
        if missing_count > 0 {
            match self.policy {
                CompletionPolicy::Strict => {
                    tracing::warn!(
                        "Discarding {}: {} of {} chunks missing",
                        buffer.file_name,
                        missing_count,
                        buffer.total_chunks
                    );
                    return CompletionOutcome::Incomplete {
                        name: buffer.file_name,
                        missing,
                        missing_count,
                    };
                }
                CompletionPolicy::Trusting => {
                    tracing::warn!(
                        "Completing {} with {} of {} chunks missing",
                        buffer.file_name,
                        missing_count,
                        buffer.total_chunks
                    );
                }
            }
        }

        let size = buffer.slots.values().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(size);
        for slot in buffer.slots.into_values() {
            bytes.extend_from_slice(&slot);
        }

        CompletionOutcome::Delivered(DeliveredPayload {
            name: buffer.file_name,
            bytes,
            missing_chunks: missing,
            missing_count,
        })
    }

    /// Handle a cancel signal: drop the buffer and refuse further chunks.
    pub fn on_cancel(&mut self) {
        if let Some(buffer) = &self.buffer {
            tracing::debug!(
                "Discarding {} of {} chunks of {}",
                buffer.slots.len(),
                buffer.total_chunks,
                buffer.file_name
            );
        }
        self.clear();
        self.canceled = true;
    }

    /// Forget everything, including a previous cancel.
    pub fn reset(&mut self) {
        self.clear();
        self.canceled = false;
    }

    fn clear(&mut self) {
        self.buffer = None;
        self.progress = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;

    use super::*;
    use crate::chunk::CHUNK_SIZE;
    use crate::code::RoomCode;
    use crate::relay::ChunkBytes;

    fn chunks_of(name: &str, data: &[u8]) -> Vec<FileChunk> {
        let room = RoomCode::parse("246810").expect("code");
        let parts: Vec<&[u8]> = data.chunks(CHUNK_SIZE as usize).collect();
        let total = parts.len() as u64;
        parts
            .into_iter()
            .enumerate()
            .map(|(i, part)| FileChunk {
                room_id: room.clone(),
                file_name: name.to_string(),
                chunk: ChunkBytes(part.to_vec()),
                chunk_index: i as u64,
                total_chunks: total,
            })
            .collect()
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn delivered(outcome: CompletionOutcome) -> DeliveredPayload {
        match outcome {
            CompletionOutcome::Delivered(p) => p,
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn test_any_order_reassembles() {
        let data = sample(6 * CHUNK_SIZE as usize + 123);
        let mut chunks = chunks_of("a.bin", &data);
        chunks.shuffle(&mut rand::thread_rng());

        let mut reassembler = ChunkReassembler::default();
        for chunk in chunks {
            assert!(reassembler.on_chunk(chunk));
        }
        assert_eq!(reassembler.received_count(), 7);

        let payload = delivered(reassembler.on_complete("a.bin"));
        assert_eq!(payload.bytes, data);
        assert!(payload.is_whole());
        assert!(!reassembler.is_allocated());
    }

    #[test]
    fn test_duplicate_chunk_is_idempotent() {
        let data = sample(3 * CHUNK_SIZE as usize);
        let chunks = chunks_of("dup.bin", &data);

        let mut reassembler = ChunkReassembler::default();
        reassembler.on_chunk(chunks[0].clone());
        reassembler.on_chunk(chunks[1].clone());
        reassembler.on_chunk(chunks[1].clone());
        reassembler.on_chunk(chunks[2].clone());
        assert_eq!(reassembler.received_count(), 3);

        assert_eq!(delivered(reassembler.on_complete("dup.bin")).bytes, data);
    }

    #[test]
    fn test_progress_follows_latest_index() {
        let chunks = chunks_of("p.bin", &sample(4 * CHUNK_SIZE as usize));
        let mut reassembler = ChunkReassembler::default();

        reassembler.on_chunk(chunks[1].clone());
        assert!((reassembler.progress() - 0.5).abs() < f64::EPSILON);
        reassembler.on_chunk(chunks[0].clone());
        assert!((reassembler.progress() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recorded_name_wins() {
        let chunks = chunks_of("first.txt", b"hello");
        let mut reassembler = ChunkReassembler::default();
        reassembler.on_chunk(chunks[0].clone());

        let payload = delivered(reassembler.on_complete("other.txt"));
        assert_eq!(payload.name, "first.txt");
    }

    #[test]
    fn test_trusting_completion_with_gap() {
        // A dropped chunk is not detected by the protocol; the payload is
        // delivered short and the gap is reported.
        let data = sample(3 * CHUNK_SIZE as usize);
        let chunks = chunks_of("gap.bin", &data);

        let mut reassembler = ChunkReassembler::new(CompletionPolicy::Trusting);
        reassembler.on_chunk(chunks[0].clone());
        reassembler.on_chunk(chunks[2].clone());

        let payload = delivered(reassembler.on_complete("gap.bin"));
        assert_eq!(payload.missing_chunks, vec![1]);
        assert_eq!(payload.missing_count, 1);
        assert!(!payload.is_whole());
        assert_eq!(payload.bytes.len(), 2 * CHUNK_SIZE as usize);
        assert_ne!(payload.bytes, data);
    }

    #[test]
    fn test_strict_completion_with_gap() {
        let chunks = chunks_of("gap.bin", &sample(3 * CHUNK_SIZE as usize));

        let mut reassembler = ChunkReassembler::new(CompletionPolicy::Strict);
        reassembler.on_chunk(chunks[0].clone());

        assert_eq!(
            reassembler.on_complete("gap.bin"),
            CompletionOutcome::Incomplete {
                name: "gap.bin".to_string(),
                missing: vec![1, 2],
                missing_count: 2,
            }
        );
        assert!(!reassembler.is_allocated());
    }

    #[test]
    fn test_strict_completion_when_whole() {
        let data = sample(CHUNK_SIZE as usize + 1);
        let mut reassembler = ChunkReassembler::new(CompletionPolicy::Strict);
        for chunk in chunks_of("ok.bin", &data) {
            reassembler.on_chunk(chunk);
        }
        assert_eq!(delivered(reassembler.on_complete("ok.bin")).bytes, data);
    }

    #[test]
    fn test_cancel_before_first_chunk_leaves_no_buffer() {
        let chunks = chunks_of("c.bin", &sample(100));
        let mut reassembler = ChunkReassembler::default();

        reassembler.on_cancel();
        assert!(!reassembler.on_chunk(chunks[0].clone()));
        assert!(!reassembler.is_allocated());
        assert_eq!(reassembler.on_complete("c.bin"), CompletionOutcome::Discarded);
    }

    #[test]
    fn test_cancel_mid_stream_discards() {
        let chunks = chunks_of("c.bin", &sample(3 * CHUNK_SIZE as usize));
        let mut reassembler = ChunkReassembler::default();

        reassembler.on_chunk(chunks[0].clone());
        reassembler.on_cancel();
        // A chunk already in flight when the cancel was sent.
        assert!(!reassembler.on_chunk(chunks[1].clone()));

        assert_eq!(reassembler.on_complete("c.bin"), CompletionOutcome::Discarded);
        assert_eq!(reassembler.received_count(), 0);

        reassembler.reset();
        assert!(!reassembler.is_canceled());
        assert!(reassembler.on_chunk(chunks[0].clone()));
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let mut chunks = chunks_of("r.bin", &sample(10));
        let mut stray = chunks[0].clone();
        stray.chunk_index = 5;

        let mut reassembler = ChunkReassembler::default();
        reassembler.on_chunk(chunks.remove(0));
        assert!(!reassembler.on_chunk(stray));
        assert_eq!(reassembler.received_count(), 1);
    }

    #[test]
    fn test_chunk_for_other_file_ignored() {
        let first = chunks_of("a.bin", &sample(2 * CHUNK_SIZE as usize));
        let other = chunks_of("b.bin", &sample(2 * CHUNK_SIZE as usize));

        let mut reassembler = ChunkReassembler::default();
        assert!(reassembler.on_chunk(first[0].clone()));
        assert!(!reassembler.on_chunk(other[1].clone()));
        assert_eq!(reassembler.received_count(), 1);
        assert_eq!(reassembler.file_name(), Some("a.bin"));
    }

    #[test]
    fn test_huge_announced_total_stays_bounded() {
        let mut chunk = chunks_of("x.bin", b"tiny").remove(0);
        chunk.total_chunks = 1 << 40;

        let mut reassembler = ChunkReassembler::new(CompletionPolicy::Trusting);
        assert!(reassembler.on_chunk(chunk.clone()));
        let payload = delivered(reassembler.on_complete("x.bin"));
        assert_eq!(payload.bytes, b"tiny");
        assert_eq!(payload.missing_count, (1 << 40) - 1);
        assert_eq!(payload.missing_chunks.len(), MAX_LISTED_MISSING);
        assert_eq!(payload.missing_chunks[0], 1);
        assert_eq!(
            payload.missing_chunks.last().copied(),
            Some(MAX_LISTED_MISSING as u64)
        );

        let mut strict = ChunkReassembler::new(CompletionPolicy::Strict);
        strict.on_chunk(chunk);
        let CompletionOutcome::Incomplete {
            missing,
            missing_count,
            ..
        } = strict.on_complete("x.bin")
        else {
            panic!("expected a refused payload");
        };
        assert_eq!(missing.len(), MAX_LISTED_MISSING);
        assert_eq!(missing_count, (1 << 40) - 1);
    }

    #[test]
    fn test_empty_payload_completion() {
        let mut reassembler = ChunkReassembler::default();
        let payload = delivered(reassembler.on_complete("empty.txt"));
        assert_eq!(payload.name, "empty.txt");
        assert!(payload.bytes.is_empty());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("strict".parse(), Ok(CompletionPolicy::Strict));
        assert_eq!("Trusting".parse(), Ok(CompletionPolicy::Trusting));
        assert!("loose".parse::<CompletionPolicy>().is_err());
        assert_eq!(CompletionPolicy::Strict.to_string(), "strict");
    }
}
