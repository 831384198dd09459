//! Error taxonomy for the transfer protocol.
//!
//! Only caller-facing operations surface errors: assembling before the
//! transfer is complete, a chunk vanishing between the completeness check
//! and the file write, or misuse of the splitter. Protocol-internal
//! anomalies (malformed metadata, messages for unknown transfers) are
//! absorbed and logged where they occur. Retry-budget exhaustion is
//! reported as data via `FileSplitter::failed_sequences`, never as an
//! error.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Assembly was attempted while chunks are still missing. `missing`
    /// is the exact count of absent sequences, or `-1` when the total is
    /// not yet known from the metadata handshake.
    #[error("file is incomplete: {missing} chunk(s) missing")]
    Incomplete { missing: i32 },

    /// A chunk present at the completeness check vanished before it was
    /// written out. The attempt must be treated as failed.
    #[error("chunk #{sequence} missing during assembly")]
    MissingChunk { sequence: i32 },

    /// `split` was called more than once on the same splitter.
    #[error("file has already been split for this transfer")]
    AlreadySplit,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// A send was attempted before the channel had the matching endpoint
    /// registered, or after the endpoint was dropped.
    #[error("no {0} registered on the channel")]
    EndpointNotRegistered(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("message serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
