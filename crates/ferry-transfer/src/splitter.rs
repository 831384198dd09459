//! Sender side — fragments a file into sequence-numbered chunks and
//! retransmits the ones the receiver reports missing, each at most
//! `max_retries` times.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use ferry_core::{Chunk, Feedback, TransferError, SEQ_METADATA};
use tokio::sync::Notify;

use crate::channel::{FeedbackReceiver, TransmissionChannel};

/// Outcome of a bounded wait for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryWait {
    /// Feedback reported an empty missing set.
    Delivered,
    /// Every pending sequence exhausted its retry budget; no further
    /// retransmission will happen.
    Stalled,
    /// The deadline passed first. The transfer should be abandoned.
    TimedOut,
}

/// One sender instance per transfer. `split` runs exactly once; after
/// that the splitter only reacts to feedback until it is delivered,
/// stalled, or abandoned.
///
/// All per-sequence state is keyed independently so feedback arrivals,
/// the split pass, and status checks never serialize on one lock.
pub struct FileSplitter {
    transfer_id: String,
    channel: Arc<dyn TransmissionChannel>,
    max_retries: u32,

    /// Every chunk emitted by the split pass, kept for retransmission.
    chunks: DashMap<i32, Chunk>,
    /// Sequences the sender currently believes need (re)sending.
    pending: DashSet<i32>,
    retry_counters: DashMap<i32, u32>,
    /// Sequences whose retry budget ran out. Permanent.
    failed: DashSet<i32>,

    total_chunks: AtomicI32,
    split_started: AtomicBool,
    delivery_complete: AtomicBool,
    progress: Notify,
}

impl FileSplitter {
    pub fn new(
        transfer_id: impl Into<String>,
        channel: Arc<dyn TransmissionChannel>,
        max_retries: u32,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            channel,
            max_retries,
            chunks: DashMap::new(),
            pending: DashSet::new(),
            retry_counters: DashMap::new(),
            failed: DashSet::new(),
            total_chunks: AtomicI32::new(-1),
            split_started: AtomicBool::new(false),
            delivery_complete: AtomicBool::new(false),
            progress: Notify::new(),
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Fragment `file` into `chunk_size`-byte chunks and send each one
    /// through the channel as it is produced. The metadata announcement
    /// (total chunk count) goes out first.
    ///
    /// Sends are fire-and-forget: a failed send leaves the chunk pending
    /// and it will go out again when the receiver reports it missing.
    pub fn split(&self, file: &Path, chunk_size: usize) -> Result<(), TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        if self.split_started.swap(true, Ordering::SeqCst) {
            return Err(TransferError::AlreadySplit);
        }

        let mut input = File::open(file)?;
        let len = input.metadata()?.len();
        let total = len.div_ceil(chunk_size as u64) as i32;
        self.total_chunks.store(total, Ordering::SeqCst);

        let metadata = Chunk::metadata(self.transfer_id.as_str(), total);
        self.chunks.insert(SEQ_METADATA, metadata.clone());
        self.pending.insert(SEQ_METADATA);
        self.send(metadata);

        let mut buf = vec![0u8; chunk_size];
        let mut sequence: i32 = 0;
        loop {
            let mut filled = 0;
            while filled < chunk_size {
                let n = input.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }

            let chunk = Chunk::data(
                self.transfer_id.as_str(),
                sequence,
                Bytes::copy_from_slice(&buf[..filled]),
            );
            self.chunks.insert(sequence, chunk.clone());
            self.pending.insert(sequence);
            self.send(chunk);
            sequence += 1;
        }

        tracing::info!(
            transfer_id = %self.transfer_id,
            bytes = len,
            chunks = total,
            chunk_size,
            "file split and sent"
        );
        Ok(())
    }

    fn send(&self, chunk: Chunk) {
        let sequence = chunk.sequence_number;
        if let Err(e) = self.channel.send_chunk(chunk) {
            tracing::warn!(
                transfer_id = %self.transfer_id,
                sequence,
                error = %e,
                "chunk send failed, left pending"
            );
        }
    }

    /// True once feedback has reported an empty missing set. Monotonic.
    pub fn is_delivery_complete(&self) -> bool {
        self.delivery_complete.load(Ordering::SeqCst)
    }

    /// Sequences that exhausted their retry budget, in order. A non-empty
    /// set is a permanent partial failure even while `is_delivery_complete`
    /// stays false — callers must check both.
    pub fn failed_sequences(&self) -> Vec<i32> {
        let mut failed: Vec<i32> = self.failed.iter().map(|s| *s).collect();
        failed.sort_unstable();
        failed
    }

    /// Total chunk count, or -1 before `split` has run.
    pub fn total_chunks(&self) -> i32 {
        self.total_chunks.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// True when every sequence still owed to the receiver has failed out:
    /// nothing will ever be retransmitted again.
    pub fn is_stalled(&self) -> bool {
        self.split_started.load(Ordering::SeqCst)
            && !self.is_delivery_complete()
            && !self.failed.is_empty()
            && self.pending.is_empty()
    }

    /// Block (async) until the transfer is delivered or stalled, or until
    /// `timeout` passes. Replaces polling loops over `is_delivery_complete`.
    pub async fn wait_until_complete(&self, timeout: Duration) -> DeliveryWait {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);
            // register interest before the state checks so a notification
            // firing in between cannot be missed
            notified.as_mut().enable();

            if self.is_delivery_complete() {
                return DeliveryWait::Delivered;
            }
            if self.is_stalled() {
                return DeliveryWait::Stalled;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return DeliveryWait::TimedOut;
            }
        }
    }

    fn apply_feedback(&self, feedback: Feedback) {
        if feedback.transfer_id != self.transfer_id {
            tracing::trace!(
                transfer_id = %self.transfer_id,
                other = %feedback.transfer_id,
                "feedback for a different transfer discarded"
            );
            return;
        }

        if feedback.missing_sequences.is_empty() {
            if !self.delivery_complete.swap(true, Ordering::SeqCst) {
                tracing::info!(transfer_id = %self.transfer_id, "delivery complete");
            }
            self.pending.clear();
            self.progress.notify_waiters();
            return;
        }

        // Charge each reported sequence against its retry budget; the
        // survivors become the new pending set and are resent.
        let mut survivors: HashSet<i32> = HashSet::new();
        for &seq in &feedback.missing_sequences {
            if self.failed.contains(&seq) {
                continue;
            }
            let attempts = {
                let mut counter = self.retry_counters.entry(seq).or_insert(0);
                *counter += 1;
                *counter
            };
            if attempts > self.max_retries {
                self.failed.insert(seq);
                tracing::warn!(
                    transfer_id = %self.transfer_id,
                    sequence = seq,
                    attempts,
                    "retry budget exhausted, sequence permanently failed"
                );
            } else {
                survivors.insert(seq);
            }
        }

        // Grow-then-shrink keeps the pending set from looking empty to a
        // concurrent stall check partway through the rebuild.
        for &seq in &survivors {
            self.pending.insert(seq);
        }
        self.pending.retain(|seq| survivors.contains(seq));

        for &seq in &survivors {
            let chunk = match self.chunks.get(&seq) {
                Some(chunk) => chunk.clone(),
                None => continue,
            };
            self.send(chunk);
        }

        tracing::debug!(
            transfer_id = %self.transfer_id,
            missing = feedback.missing_sequences.len(),
            resent = survivors.len(),
            failed = self.failed.len(),
            "feedback applied"
        );
        self.progress.notify_waiters();
    }
}

impl FeedbackReceiver for FileSplitter {
    fn receive_feedback(&self, feedback: Feedback) {
        self.apply_feedback(feedback);
    }
}
