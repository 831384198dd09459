//! Receiver side — accumulates chunks, learns the expected total from the
//! metadata handshake, reports missing sequences, and materializes the
//! file once everything has arrived.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ferry_core::{Chunk, Feedback, TransferError, TOTAL_UNKNOWN};

use crate::channel::{ChunkReceiver, TransmissionChannel};

/// One receiver instance per transfer.
///
/// Chunk writes are idempotent: duplicates overwrite an identical entry
/// and change nothing. The missing-set computation is safe to run while
/// chunks keep arriving — a chunk landing mid-computation may or may not
/// be reflected in that cycle, and the next cycle corrects it.
pub struct FileAssembler {
    transfer_id: String,
    channel: Arc<dyn TransmissionChannel>,

    received: DashMap<i32, Chunk>,
    /// Expected chunk count; -1 until the metadata chunk arrives.
    total_chunks: AtomicI32,
    assembled: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl FileAssembler {
    pub fn new(transfer_id: impl Into<String>, channel: Arc<dyn TransmissionChannel>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            channel,
            received: DashMap::new(),
            total_chunks: AtomicI32::new(TOTAL_UNKNOWN),
            assembled: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Expected total, or -1 while the metadata handshake is outstanding.
    pub fn total_chunks(&self) -> i32 {
        self.total_chunks.load(Ordering::SeqCst)
    }

    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// Time since the last accepted message. Used by registry eviction to
    /// reclaim abandoned transfers.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn accept(&self, chunk: Chunk) {
        if chunk.transfer_id != self.transfer_id {
            tracing::trace!(
                transfer_id = %self.transfer_id,
                other = %chunk.transfer_id,
                "chunk for a different transfer discarded"
            );
            return;
        }

        if chunk.is_metadata() {
            match chunk.metadata_total() {
                Some(total) => {
                    // Set exactly once; re-deliveries of the metadata
                    // chunk carry the same value anyway.
                    if self
                        .total_chunks
                        .compare_exchange(TOTAL_UNKNOWN, total, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        tracing::debug!(
                            transfer_id = %self.transfer_id,
                            total,
                            "metadata received"
                        );
                    }
                    self.touch();
                }
                None => {
                    // Not fatal: the total stays unknown and the next
                    // feedback cycle re-requests metadata.
                    tracing::warn!(
                        transfer_id = %self.transfer_id,
                        payload = %String::from_utf8_lossy(&chunk.data),
                        "malformed metadata payload ignored"
                    );
                }
            }
            return;
        }

        if chunk.sequence_number < 0 {
            tracing::warn!(
                transfer_id = %self.transfer_id,
                sequence = chunk.sequence_number,
                "chunk with invalid sequence number discarded"
            );
            return;
        }

        self.received.insert(chunk.sequence_number, chunk);
        self.touch();
    }

    /// Compute the current missing set and send it as feedback, or
    /// re-request metadata while the total is still unknown.
    pub fn send_feedback(&self) -> Result<(), TransferError> {
        let total = self.total_chunks();
        if total == TOTAL_UNKNOWN {
            tracing::debug!(transfer_id = %self.transfer_id, "requesting metadata resend");
            return self
                .channel
                .send_feedback(Feedback::metadata_request(self.transfer_id.as_str()));
        }

        let missing: std::collections::BTreeSet<i32> = (0..total)
            .filter(|seq| !self.received.contains_key(seq))
            .collect();

        tracing::debug!(
            transfer_id = %self.transfer_id,
            total,
            missing = missing.len(),
            "sending feedback"
        );
        self.channel
            .send_feedback(Feedback::missing(self.transfer_id.as_str(), total, missing))
    }

    /// True once the metadata handshake happened and every expected chunk
    /// is present. A learned total of zero (empty file) is complete as
    /// soon as the metadata arrives.
    pub fn is_file_complete(&self) -> bool {
        let total = self.total_chunks();
        total != TOTAL_UNKNOWN && self.received.len() >= total as usize
    }

    /// True after a successful `assemble_file`.
    pub fn is_assembled(&self) -> bool {
        self.assembled.load(Ordering::SeqCst)
    }

    /// Write chunks `0..total` to `output` in strict sequence order.
    ///
    /// Fails with `Incomplete` before `is_file_complete`, and with
    /// `MissingChunk` if a sequence vanished between the completeness
    /// check and the write. Either failure leaves no guarantee about
    /// partial output; the caller must treat the attempt as failed.
    pub fn assemble_file(&self, output: &Path) -> Result<(), TransferError> {
        let total = self.total_chunks();
        if !self.is_file_complete() {
            let missing = if total == TOTAL_UNKNOWN {
                -1
            } else {
                (0..total).filter(|seq| !self.received.contains_key(seq)).count() as i32
            };
            return Err(TransferError::Incomplete { missing });
        }

        let mut writer = BufWriter::new(File::create(output)?);
        for seq in 0..total {
            let chunk = self
                .received
                .get(&seq)
                .ok_or(TransferError::MissingChunk { sequence: seq })?;
            writer.write_all(&chunk.data)?;
        }
        writer.flush()?;

        self.assembled.store(true, Ordering::SeqCst);
        tracing::info!(
            transfer_id = %self.transfer_id,
            chunks = total,
            path = %output.display(),
            "file assembled"
        );
        Ok(())
    }
}

impl ChunkReceiver for FileAssembler {
    fn receive_chunk(&self, chunk: Chunk) {
        self.accept(chunk);
    }

    fn emit_feedback(&self) -> Result<(), TransferError> {
        self.send_feedback()
    }

    fn is_complete(&self) -> bool {
        self.is_file_complete()
    }
}
