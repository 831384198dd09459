//! Consumer loops — one task per partition per topic, dispatching records
//! to the matching state machine through the registries.
//!
//! A record failure never exits a loop: undecodable records are poison
//! and dropped after one warning; a feedback record for a transfer whose
//! splitter is not registered yet is retried a fixed number of times with
//! a fixed backoff (setup can race the first feedback), then dropped.

use std::sync::Arc;
use std::time::Duration;

use ferry_core::config::BrokerConfig;
use ferry_core::{Chunk, Feedback};
use ferry_transfer::{
    AssemblerRegistry, ChunkReceiver, FeedbackReceiver, FileAssembler, SplitterRegistry,
};
use tokio::sync::broadcast;

use crate::topic::{Record, Subscription};

/// Builds the assembler for a transfer the chunk consumer has not seen
/// before. Injected so the consumer stays ignorant of channel wiring.
pub type AssemblerFactory = Arc<dyn Fn(&str) -> Arc<FileAssembler> + Send + Sync>;

pub struct ChunkConsumer {
    subscription: Subscription,
    assemblers: AssemblerRegistry,
    factory: AssemblerFactory,
    shutdown: broadcast::Receiver<()>,
}

impl ChunkConsumer {
    pub fn new(
        subscription: Subscription,
        assemblers: AssemblerRegistry,
        factory: AssemblerFactory,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            subscription,
            assemblers,
            factory,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!("chunk consumer shutting down");
                    return;
                }
                record = self.subscription.poll() => self.process(record),
            }
        }
    }

    fn process(&self, record: Record) {
        let chunk: Chunk = match serde_json::from_slice(&record.payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(
                    offset = record.offset,
                    key = %record.key,
                    error = %e,
                    "dropping undecodable chunk record"
                );
                return;
            }
        };

        let assembler = self
            .assemblers
            .get_or_create(&chunk.transfer_id, |id| (self.factory)(id));
        assembler.receive_chunk(chunk);
    }
}

pub struct FeedbackConsumer {
    subscription: Subscription,
    splitters: SplitterRegistry,
    max_retries: u32,
    backoff: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl FeedbackConsumer {
    pub fn new(
        subscription: Subscription,
        splitters: SplitterRegistry,
        config: &BrokerConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            subscription,
            splitters,
            max_retries: config.consumer_max_retries,
            backoff: config.consumer_backoff(),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::debug!("feedback consumer shutting down");
                    return;
                }
                record = self.subscription.poll() => self.process(record).await,
            }
        }
    }

    async fn process(&self, record: Record) {
        let feedback: Feedback = match serde_json::from_slice(&record.payload) {
            Ok(feedback) => feedback,
            Err(e) => {
                tracing::warn!(
                    offset = record.offset,
                    key = %record.key,
                    error = %e,
                    "dropping undecodable feedback record"
                );
                return;
            }
        };

        let mut attempt = 0;
        loop {
            if let Some(splitter) = self.splitters.get(&feedback.transfer_id) {
                splitter.receive_feedback(feedback);
                return;
            }
            if attempt >= self.max_retries {
                tracing::warn!(
                    transfer_id = %feedback.transfer_id,
                    attempts = attempt,
                    "dropping feedback for unregistered transfer"
                );
                return;
            }
            attempt += 1;
            tracing::debug!(
                transfer_id = %feedback.transfer_id,
                attempt,
                "splitter not registered, retrying dispatch"
            );
            tokio::time::sleep(self.backoff).await;
        }
    }
}
