//! Protocol messages — the chunk and feedback values exchanged between
//! the sender and receiver roles.
//!
//! Both types serialize to the camelCase wire shape used on every
//! transport:
//!
//!   Chunk:    { "sequenceNumber": i32, "data": bytes, "transferId": string }
//!   Feedback: { "transferId": string, "totalChunks": i32, "missingSequences": [i32] }

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Reserved sequence number for the metadata announcement chunk. Its
/// payload is the total chunk count encoded as decimal text.
pub const SEQ_METADATA: i32 = -1;

/// `Feedback.total_chunks` value meaning the receiver has not yet learned
/// the total from the metadata handshake.
pub const TOTAL_UNKNOWN: i32 = -1;

/// A sequence-numbered fragment of file data, or the metadata announcement.
///
/// For `sequence_number >= 0` the payload is the byte range
/// `[seq * chunk_size, seq * chunk_size + data.len())` of the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub sequence_number: i32,
    pub data: Bytes,
    pub transfer_id: String,
}

impl Chunk {
    /// A file-data chunk.
    pub fn data(transfer_id: impl Into<String>, sequence_number: i32, data: Bytes) -> Self {
        Self {
            sequence_number,
            data,
            transfer_id: transfer_id.into(),
        }
    }

    /// The metadata announcement carrying the total chunk count as text.
    pub fn metadata(transfer_id: impl Into<String>, total_chunks: i32) -> Self {
        Self {
            sequence_number: SEQ_METADATA,
            data: Bytes::from(total_chunks.to_string()),
            transfer_id: transfer_id.into(),
        }
    }

    pub fn is_metadata(&self) -> bool {
        self.sequence_number == SEQ_METADATA
    }

    /// Parse the total chunk count out of a metadata payload.
    /// `None` for malformed payloads — the caller logs and moves on; the
    /// receiver will re-request metadata on its next feedback cycle.
    pub fn metadata_total(&self) -> Option<i32> {
        std::str::from_utf8(&self.data)
            .ok()?
            .parse::<i32>()
            .ok()
            .filter(|total| *total >= 0)
    }
}

// Chunk identity is (transfer_id, sequence_number); the payload is
// immutable for a given identity, so it does not participate.
impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.transfer_id == other.transfer_id && self.sequence_number == other.sequence_number
    }
}

impl Eq for Chunk {}

impl Hash for Chunk {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transfer_id.hash(state);
        self.sequence_number.hash(state);
    }
}

/// Receiver-to-sender report of which sequence numbers are still missing,
/// or a metadata re-request (`total_chunks == -1`, `missing == {-1}`).
///
/// A known total with an empty missing set means the transfer is fully
/// received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub transfer_id: String,
    pub total_chunks: i32,
    pub missing_sequences: BTreeSet<i32>,
}

impl Feedback {
    pub fn missing(
        transfer_id: impl Into<String>,
        total_chunks: i32,
        missing_sequences: BTreeSet<i32>,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            total_chunks,
            missing_sequences,
        }
    }

    /// Everything received — the sender flips delivery-complete on this.
    pub fn complete(transfer_id: impl Into<String>, total_chunks: i32) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            total_chunks,
            missing_sequences: BTreeSet::new(),
        }
    }

    /// Request a resend of the metadata announcement.
    pub fn metadata_request(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            total_chunks: TOTAL_UNKNOWN,
            missing_sequences: BTreeSet::from([SEQ_METADATA]),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_chunks != TOTAL_UNKNOWN && self.missing_sequences.is_empty()
    }

    pub fn is_metadata_request(&self) -> bool {
        self.total_chunks == TOTAL_UNKNOWN
    }
}
