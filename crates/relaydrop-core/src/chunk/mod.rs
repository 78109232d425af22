//! Sender-side chunking engine.
//!
//! A payload is cut into fixed 64 KiB chunks and sent strictly in order with
//! at most one chunk in flight: chunk `k + 1` is not read until chunk `k` has
//! been emitted or suppressed. The loop is an explicit state machine driven
//! by [`ChunkEncoder::tick`], so very large payloads never grow the stack.
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. The shared [`CancellationToken`] is checked
//! before each read, after each read completes, and once more right before
//! the event is handed to the relay. Nothing already emitted is retracted,
//! so a receiver may still observe one chunk after a late cancel.

use tokio_util::sync::CancellationToken;

use crate::code::RoomCode;
use crate::error::Result;
use crate::payload::{Payload, PayloadReader};
use crate::relay::{ChunkBytes, FileChunk, RelayEvent, RelaySender, SendFileComplete};

/// Fixed chunk size in bytes. Not negotiated.
pub const CHUNK_SIZE: u64 = 64 * 1024;

/// Number of chunks needed for a payload of `byte_length` bytes.
#[must_use]
pub const fn total_chunks(byte_length: u64) -> u64 {
    byte_length.div_ceil(CHUNK_SIZE)
}

/// Result of one [`ChunkEncoder::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderStep {
    /// The next chunk was read and should be emitted
    Chunk(FileChunk),
    /// Every chunk is out; the completion marker should be emitted
    Complete(SendFileComplete),
    /// Cancellation was observed; nothing further may be emitted
    Aborted,
    /// The completion marker was already produced
    Finished,
}

/// How a send loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOutcome {
    /// All chunks and the completion marker were emitted
    Completed {
        /// Chunks emitted
        chunks: u64,
    },
    /// The loop stopped early because of cancellation
    Aborted {
        /// Chunks emitted before stopping
        chunks_emitted: u64,
    },
}

/// Result of one [`ChunkEncoder::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// A chunk was handed to the relay
    Sent {
        /// Index of the chunk
        chunk_index: u64,
        /// Fraction of the payload sent, `(chunk_index + 1) / total_chunks`
        progress: f64,
    },
    /// The loop is over
    Done(EncoderOutcome),
}

/// Sequential chunk sender for one payload.
#[derive(Debug)]
pub struct ChunkEncoder {
    payload: Payload,
    reader: Option<PayloadReader>,
    room: RoomCode,
    total_chunks: u64,
    next_index: u64,
    emitted: u64,
    finished: bool,
    cancel: CancellationToken,
}

impl ChunkEncoder {
    /// Prepare to send `payload` to `room`.
    #[must_use]
    pub fn new(payload: Payload, room: RoomCode, cancel: CancellationToken) -> Self {
        let total_chunks = total_chunks(payload.byte_length());
        Self {
            payload,
            reader: None,
            room,
            total_chunks,
            next_index: 0,
            emitted: 0,
            finished: false,
            cancel,
        }
    }

    /// Number of chunks the payload is cut into.
    #[must_use]
    pub const fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Index of the next chunk to read.
    #[must_use]
    pub const fn next_index(&self) -> u64 {
        self.next_index
    }

    /// The payload being sent.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Fraction of chunks emitted so far.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }
        self.emitted as f64 / self.total_chunks as f64
    }

    /// Byte range `[start, end)` covered by chunk `index`.
    #[must_use]
    pub fn chunk_range(&self, index: u64) -> (u64, u64) {
        let start = index * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(self.payload.byte_length());
        (start, end)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Produce the next step of the send loop.
    ///
    /// Reads the next chunk asynchronously. If cancellation is observed
    /// before or after the read, returns [`EncoderStep::Aborted`] and the
    /// read bytes are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload source cannot be read.
    pub async fn tick(&mut self) -> Result<EncoderStep> {
        if self.finished {
            return Ok(EncoderStep::Finished);
        }
        if self.cancel.is_cancelled() {
            return Ok(EncoderStep::Aborted);
        }

        if self.next_index >= self.total_chunks {
            self.finished = true;
            self.reader = None;
            return Ok(EncoderStep::Complete(SendFileComplete {
                room_id: self.room.clone(),
                file_name: self.payload.name().to_string(),
            }));
        }

        let index = self.next_index;
        let (start, end) = self.chunk_range(index);
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => self.payload.source().open().await?,
        };
        let bytes = reader.read_range(start, end).await?;
        self.reader = Some(reader);

        if self.cancel.is_cancelled() {
            tracing::debug!("Discarding chunk {} read after cancel", index);
            return Ok(EncoderStep::Aborted);
        }

        self.next_index += 1;
        Ok(EncoderStep::Chunk(FileChunk {
            room_id: self.room.clone(),
            file_name: self.payload.name().to_string(),
            chunk: ChunkBytes(bytes),
            chunk_index: index,
            total_chunks: self.total_chunks,
        }))
    }

    /// Run one tick and emit its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read or the relay is gone.
    pub async fn advance(&mut self, sender: &RelaySender) -> Result<Advance> {
        match self.tick().await? {
            EncoderStep::Chunk(chunk) => {
                let chunk_index = chunk.chunk_index;
                let size = chunk.chunk.len();
                if !sender
                    .emit_unless_cancelled(RelayEvent::FileChunk(chunk), &self.cancel)
                    .await?
                {
                    return Ok(Advance::Done(self.aborted()));
                }
                self.emitted += 1;
                tracing::debug!(
                    "Sent chunk {}/{} ({} bytes)",
                    chunk_index + 1,
                    self.total_chunks,
                    size
                );
                Ok(Advance::Sent {
                    chunk_index,
                    progress: (chunk_index + 1) as f64 / self.total_chunks as f64,
                })
            }
            EncoderStep::Complete(complete) => {
                if !sender
                    .emit_unless_cancelled(RelayEvent::SendFileComplete(complete), &self.cancel)
                    .await?
                {
                    return Ok(Advance::Done(self.aborted()));
                }
                tracing::info!(
                    "Sent {} ({} chunks)",
                    self.payload.name(),
                    self.total_chunks
                );
                Ok(Advance::Done(EncoderOutcome::Completed {
                    chunks: self.emitted,
                }))
            }
            EncoderStep::Aborted => Ok(Advance::Done(self.aborted())),
            EncoderStep::Finished => Ok(Advance::Done(EncoderOutcome::Completed {
                chunks: self.emitted,
            })),
        }
    }

    /// Drive the whole loop, reporting progress after every emitted chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read or the relay is gone.
    pub async fn run<F>(&mut self, sender: &RelaySender, mut on_progress: F) -> Result<EncoderOutcome>
    where
        F: FnMut(f64),
    {
        loop {
            match self.advance(sender).await? {
                Advance::Sent { progress, .. } => on_progress(progress),
                Advance::Done(outcome) => return Ok(outcome),
            }
        }
    }

    fn aborted(&mut self) -> EncoderOutcome {
        self.finished = true;
        self.reader = None;
        tracing::info!(
            "Send of {} aborted after {} of {} chunks",
            self.payload.name(),
            self.emitted,
            self.total_chunks
        );
        EncoderOutcome::Aborted {
            chunks_emitted: self.emitted,
        }
    }
}
