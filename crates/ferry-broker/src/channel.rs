//! Broker-backed transmission channel.

use std::sync::Arc;

use bytes::Bytes;
use ferry_core::{Chunk, Feedback, TransferError};
use ferry_transfer::TransmissionChannel;

use crate::topic::Topic;

/// Publishes protocol messages to the broker's topics, keyed by transfer
/// id. Delivery to the matching state machine happens on the consumer
/// side via registry lookup; this end never holds endpoint references.
#[derive(Clone)]
pub struct BrokerChannel {
    chunk_topic: Arc<Topic>,
    feedback_topic: Arc<Topic>,
}

impl BrokerChannel {
    pub(crate) fn new(chunk_topic: Arc<Topic>, feedback_topic: Arc<Topic>) -> Self {
        Self {
            chunk_topic,
            feedback_topic,
        }
    }
}

impl TransmissionChannel for BrokerChannel {
    fn send_chunk(&self, chunk: Chunk) -> Result<(), TransferError> {
        let payload = serde_json::to_vec(&chunk)?;
        self.chunk_topic
            .publish(&chunk.transfer_id, Bytes::from(payload));
        Ok(())
    }

    fn send_feedback(&self, feedback: Feedback) -> Result<(), TransferError> {
        let payload = serde_json::to_vec(&feedback)?;
        self.feedback_topic
            .publish(&feedback.transfer_id, Bytes::from(payload));
        Ok(())
    }
}
