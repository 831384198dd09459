//! ferry-broker — durable in-process topic broker and the broker-backed
//! transmission channel.
//!
//! Chunks and feedback are published to two partitioned topics keyed by
//! transfer id, so sender and receiver lifetimes are decoupled: records
//! are retained until process exit and a consumer attaching late replays
//! everything. One consumer task per partition per topic resolves the
//! target state machine through the registries.
//!
//! Keying gives co-location of one transfer's records on one partition,
//! not in-order delivery; correctness rests on sequence numbers.

pub mod channel;
pub mod consumer;
pub mod topic;

use std::sync::Arc;

use ferry_core::config::BrokerConfig;
use ferry_transfer::{AssemblerRegistry, SplitterRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use channel::BrokerChannel;
use consumer::{AssemblerFactory, ChunkConsumer, FeedbackConsumer};
use topic::Topic;

/// Topic carrying chunk records, keyed by transfer id.
pub const CHUNK_TOPIC: &str = "file-chunks";
/// Topic carrying feedback records, keyed by transfer id.
pub const FEEDBACK_TOPIC: &str = "file-feedbacks";

/// The embedded broker: owns both topics, hands out channels, and spawns
/// the consumer fleet.
pub struct MessageBroker {
    chunk_topic: Arc<Topic>,
    feedback_topic: Arc<Topic>,
    config: BrokerConfig,
}

impl MessageBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            chunk_topic: Arc::new(Topic::new(CHUNK_TOPIC, config.partitions)),
            feedback_topic: Arc::new(Topic::new(FEEDBACK_TOPIC, config.partitions)),
            config,
        }
    }

    /// A channel publishing into this broker's topics. Cheap to clone;
    /// every splitter/assembler of the process can share one.
    pub fn channel(&self) -> BrokerChannel {
        BrokerChannel::new(self.chunk_topic.clone(), self.feedback_topic.clone())
    }

    /// Spawn one consumer per partition per topic. Chunk records route
    /// through `assemblers` (creating missing assemblers with `factory`);
    /// feedback records route through `splitters`. All consumers stop on
    /// the `shutdown` signal.
    pub fn spawn_consumers(
        &self,
        splitters: SplitterRegistry,
        assemblers: AssemblerRegistry,
        factory: AssemblerFactory,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for partition in 0..self.chunk_topic.partition_count() {
            let consumer = ChunkConsumer::new(
                self.chunk_topic.subscribe(partition),
                assemblers.clone(),
                factory.clone(),
                shutdown.subscribe(),
            );
            handles.push(tokio::spawn(consumer.run()));
        }
        for partition in 0..self.feedback_topic.partition_count() {
            let consumer = FeedbackConsumer::new(
                self.feedback_topic.subscribe(partition),
                splitters.clone(),
                &self.config,
                shutdown.subscribe(),
            );
            handles.push(tokio::spawn(consumer.run()));
        }
        tracing::info!(
            partitions = self.config.partitions,
            consumers = handles.len(),
            "broker consumers started"
        );
        handles
    }
}
