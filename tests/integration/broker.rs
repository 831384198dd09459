//! Transfers over the embedded broker: one shared consumer fleet
//! multiplexing many transfers through the registries.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ferry_broker::consumer::AssemblerFactory;
use ferry_broker::MessageBroker;
use ferry_core::config::BrokerConfig;
use ferry_core::{Chunk, Feedback};
use ferry_transfer::{
    AssemblerRegistry, FileAssembler, FileSplitter, SplitterRegistry, TransmissionChannel,
};
use tokio::sync::broadcast;

use crate::util;

struct Cluster {
    channel: Arc<dyn TransmissionChannel>,
    splitters: SplitterRegistry,
    assemblers: AssemblerRegistry,
    shutdown_tx: broadcast::Sender<()>,
    consumers: Vec<tokio::task::JoinHandle<()>>,
}

/// Stand up a broker with its consumer fleet. Assemblers are created on
/// demand by the chunk consumer; splitters must be registered by the
/// test before feedback for them arrives.
fn cluster(config: BrokerConfig) -> Cluster {
    let broker = MessageBroker::new(config);
    let channel: Arc<dyn TransmissionChannel> = Arc::new(broker.channel());

    let splitters = SplitterRegistry::new();
    let assemblers = AssemblerRegistry::new();

    let factory: AssemblerFactory = {
        let channel = channel.clone();
        Arc::new(move |id: &str| Arc::new(FileAssembler::new(id, channel.clone())))
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let consumers = broker.spawn_consumers(
        splitters.clone(),
        assemblers.clone(),
        factory,
        &shutdown_tx,
    );

    Cluster {
        channel,
        splitters,
        assemblers,
        shutdown_tx,
        consumers,
    }
}

impl Cluster {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        for consumer in self.consumers {
            consumer.await.unwrap();
        }
    }
}

#[tokio::test]
async fn concurrent_transfers_multiplex_over_one_broker() {
    util::init_tracing();
    let dir = util::test_dir("broker-multiplex");

    let cluster = cluster(BrokerConfig {
        partitions: 4,
        consumer_max_retries: 3,
        consumer_backoff_ms: 10,
    });

    let transfers = [("t-alpha", 10_000usize), ("t-beta", 3_500), ("t-gamma", 512)];
    let mut inputs = Vec::new();
    for (id, len) in &transfers {
        let data = util::pattern_bytes(*len);
        let input = util::write_input(&dir, &format!("{id}-in.bin"), &data).unwrap();

        // a generous budget: feedback cycles tick faster than consumer
        // dispatch settles, and every cycle charges the counters
        let splitter = Arc::new(FileSplitter::new(*id, cluster.channel.clone(), 100));
        cluster.splitters.insert(splitter.clone());
        splitter.split(&input, 512).unwrap();
        inputs.push((id, data, splitter));
    }

    // Feedback cadence belongs to the orchestration side in the broker
    // variant; tick it until every sender observes completeness.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if inputs.iter().all(|(_, _, s)| s.is_delivery_complete()) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "transfers did not complete in time"
        );
        for (id, _, _) in &inputs {
            if let Some(assembler) = cluster.assemblers.get(id) {
                assembler.send_feedback().unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for (id, data, splitter) in &inputs {
        assert!(splitter.failed_sequences().is_empty());

        let assembler = cluster.assemblers.get(id).unwrap();
        assert!(assembler.is_file_complete());
        let output = dir.join(format!("{id}-out.bin"));
        assembler.assemble_file(&output).unwrap();
        assert_eq!(&std::fs::read(&output).unwrap(), data);

        // resolved transfers are evicted to bound memory
        cluster.splitters.remove(id);
        cluster.assemblers.remove(id);
    }
    assert!(cluster.splitters.is_empty());
    assert!(cluster.assemblers.is_empty());

    cluster.stop().await;
}

/// Unroutable records (feedback for a transfer nobody registered) are
/// dropped after their retries without killing the consumer loop: a
/// transfer started afterwards still completes.
#[tokio::test]
async fn consumer_fleet_survives_unroutable_records() {
    util::init_tracing();
    let dir = util::test_dir("broker-unroutable");

    let cluster = cluster(BrokerConfig {
        partitions: 2,
        consumer_max_retries: 2,
        consumer_backoff_ms: 10,
    });

    cluster
        .channel
        .send_feedback(Feedback::metadata_request("t-ghost"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cluster.splitters.is_empty());

    let data = util::pattern_bytes(2_048);
    let input = util::write_input(&dir, "in.bin", &data).unwrap();
    let splitter = Arc::new(FileSplitter::new("t-after", cluster.channel.clone(), 50));
    cluster.splitters.insert(splitter.clone());
    splitter.split(&input, 512).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !splitter.is_delivery_complete() {
        assert!(tokio::time::Instant::now() < deadline, "transfer stuck");
        if let Some(assembler) = cluster.assemblers.get("t-after") {
            assembler.send_feedback().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cluster.stop().await;
}

/// A straggler data chunk for a transfer nobody started admits a fresh
/// assembler that can never complete (its metadata will not come); idle
/// eviction reclaims it.
#[tokio::test]
async fn straggler_chunk_is_reclaimed_by_idle_eviction() {
    util::init_tracing();

    let cluster = cluster(BrokerConfig {
        partitions: 2,
        consumer_max_retries: 2,
        consumer_backoff_ms: 10,
    });

    cluster
        .channel
        .send_chunk(Chunk::data("t-straggler", 7, Bytes::from_static(b"late")))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stray = cluster.assemblers.get("t-straggler").expect("stray assembler");
    assert!(!stray.is_file_complete());
    drop(stray);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cluster.assemblers.evict_idle(Duration::from_millis(1)), 1);
    assert!(cluster.assemblers.is_empty());

    cluster.stop().await;
}
