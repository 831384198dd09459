//! Channel abstraction between the sender and receiver roles.
//!
//! The channel never owns the endpoints it delivers to; it depends on two
//! narrow capability traits instead of concrete splitter/assembler types.
//! The direct channel holds weak references handed over at registration;
//! the broker-backed channel resolves endpoints through the registries.
//! Either way the state machines stay transport-agnostic.

use ferry_core::{Chunk, Feedback, TransferError};

/// Receiver-side endpoint of one transfer.
///
/// Implemented by `FileAssembler`. `emit_feedback` and `is_complete` exist
/// so a channel-owned scheduler can drive feedback cadence without knowing
/// the concrete receiver type.
pub trait ChunkReceiver: Send + Sync {
    /// Accept a chunk. Messages for a different transfer id are discarded
    /// by the implementation, never by the channel.
    fn receive_chunk(&self, chunk: Chunk);

    /// Compute and send the current missing-set feedback (or a metadata
    /// re-request) back through the channel.
    fn emit_feedback(&self) -> Result<(), TransferError>;

    /// True once every expected chunk has been received.
    fn is_complete(&self) -> bool;
}

/// Sender-side endpoint of one transfer. Implemented by `FileSplitter`.
pub trait FeedbackReceiver: Send + Sync {
    fn receive_feedback(&self, feedback: Feedback);
}

/// A transport that moves chunks toward the receiver endpoint and feedback
/// toward the sender endpoint of the matching transfer.
///
/// Sends are fire-and-forget: an `Ok` return means the message was handed
/// to the transport, not that it arrived. The direct implementation may
/// drop chunks by design; the broker implementation may deliver them in
/// any order. Correctness rests on sequence numbers alone.
pub trait TransmissionChannel: Send + Sync {
    fn send_chunk(&self, chunk: Chunk) -> Result<(), TransferError>;
    fn send_feedback(&self, feedback: Feedback) -> Result<(), TransferError>;
}
