//! Transfers over the in-process lossy channel.

use std::sync::Arc;
use std::time::Duration;

use ferry_core::{FerryConfig, TransferStatus, SEQ_METADATA, TOTAL_UNKNOWN};
use ferry_transfer::{
    run_direct_transfer, ChunkReceiver, DeliveryWait, DirectChannel, FeedbackReceiver,
    FileAssembler, FileSplitter, TransmissionChannel,
};

use crate::util;

struct Pair {
    splitter: Arc<FileSplitter>,
    assembler: Arc<FileAssembler>,
}

/// Wire one splitter/assembler pair over a direct channel with the given
/// loss probability. Feedback cadence is driven by the test.
fn wire(transfer_id: &str, loss_probability: f64, max_retries: u32) -> Pair {
    let channel = Arc::new(DirectChannel::new(loss_probability));
    let transport: Arc<dyn TransmissionChannel> = channel.clone();

    let splitter = Arc::new(FileSplitter::new(transfer_id, transport.clone(), max_retries));
    let assembler = Arc::new(FileAssembler::new(transfer_id, transport));

    let receiver: Arc<dyn ChunkReceiver> = assembler.clone();
    let sender: Arc<dyn FeedbackReceiver> = splitter.clone();
    channel.register_assembler(&receiver);
    channel.register_splitter(&sender);

    Pair {
        splitter,
        assembler,
    }
}

/// 10,000 bytes at chunkSize 1024: 10 chunks (9 full + one of 784), and
/// with zero loss the first feedback cycle already reports nothing
/// missing — no retransmission round is needed.
#[tokio::test]
async fn ten_kilobyte_file_zero_loss_single_pass() {
    util::init_tracing();
    let dir = util::test_dir("zero-loss");
    let data = util::pattern_bytes(10_000);
    let input = util::write_input(&dir, "in.bin", &data).unwrap();
    let output = dir.join("out.bin");

    let pair = wire("t-zero-loss", 0.0, 5);
    pair.splitter.split(&input, 1024).unwrap();

    assert_eq!(pair.splitter.total_chunks(), 10);
    assert_eq!(pair.assembler.received_count(), 10);

    pair.assembler.send_feedback().unwrap();
    assert!(pair.splitter.is_delivery_complete());
    assert!(pair.splitter.failed_sequences().is_empty());
    assert_eq!(pair.splitter.pending_count(), 0);

    pair.assembler.assemble_file(&output).unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

/// The packaged driver runs the same lifecycle with the channel's own
/// feedback scheduler.
#[tokio::test]
async fn driver_completes_lossless_transfer() {
    util::init_tracing();
    let dir = util::test_dir("driver");
    let data = util::pattern_bytes(50_000);
    let input = util::write_input(&dir, "in.bin", &data).unwrap();
    let output = dir.join("out.bin");

    let mut config = FerryConfig::default();
    config.transfer.chunk_size = 1024;
    config.transfer.feedback_interval_ms = 10;
    config.transfer.completion_timeout_ms = 5_000;

    let report = run_direct_transfer("t-driver", &input, &output, &config)
        .await
        .unwrap();

    assert_eq!(report.status, TransferStatus::AssembleCompleted);
    assert_eq!(report.total_chunks, 49);
    assert!(report.failed_sequences.is_empty());
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

/// With loss and an effectively unbounded retry budget, retransmission
/// rounds converge on completeness within a bounded number of cycles.
#[tokio::test]
async fn lossy_transfer_eventually_completes() {
    util::init_tracing();
    let dir = util::test_dir("lossy");
    let data = util::pattern_bytes(20_000);
    let input = util::write_input(&dir, "in.bin", &data).unwrap();
    let output = dir.join("out.bin");

    let pair = wire("t-lossy", 0.3, 1_000);
    pair.splitter.split(&input, 512).unwrap();

    let mut cycles = 0;
    while !pair.splitter.is_delivery_complete() {
        assert!(cycles < 200, "transfer did not converge within 200 cycles");
        pair.assembler.send_feedback().unwrap();
        cycles += 1;
    }

    assert!(pair.assembler.is_file_complete());
    pair.assembler.assemble_file(&output).unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

/// lossProbability = 1: the metadata never arrives, the receiver keeps
/// re-requesting it every cycle, and once its retry budget runs out the
/// transfer stalls instead of hanging.
#[tokio::test]
async fn total_loss_keeps_requesting_metadata_then_stalls() {
    util::init_tracing();
    let dir = util::test_dir("total-loss");
    let data = util::pattern_bytes(4_096);
    let input = util::write_input(&dir, "in.bin", &data).unwrap();
    let output = dir.join("out.bin");

    let pair = wire("t-black-hole", 1.0, 5);
    pair.splitter.split(&input, 1024).unwrap();
    assert_eq!(pair.assembler.received_count(), 0);

    // every cycle is a metadata re-request because the total is never learned
    for _ in 0..6 {
        assert_eq!(pair.assembler.total_chunks(), TOTAL_UNKNOWN);
        pair.assembler.send_feedback().unwrap();
    }

    assert_eq!(pair.splitter.failed_sequences(), vec![SEQ_METADATA]);
    let wait = pair
        .splitter
        .wait_until_complete(Duration::from_millis(500))
        .await;
    assert_eq!(wait, DeliveryWait::Stalled);

    assert!(!pair.splitter.is_delivery_complete());
    assert!(!pair.assembler.is_file_complete());
    match pair.assembler.assemble_file(&output).unwrap_err() {
        ferry_core::TransferError::Incomplete { missing } => assert_eq!(missing, -1),
        other => panic!("unexpected error: {other}"),
    }
}

/// The scheduler lifecycle end to end: started by the driver, stopped by
/// completion, with the channel shut down afterwards.
#[tokio::test]
async fn empty_file_round_trips() {
    util::init_tracing();
    let dir = util::test_dir("empty");
    let input = util::write_input(&dir, "in.bin", b"").unwrap();
    let output = dir.join("out.bin");

    let mut config = FerryConfig::default();
    config.transfer.chunk_size = 1024;
    config.transfer.feedback_interval_ms = 10;
    config.transfer.completion_timeout_ms = 2_000;

    let report = run_direct_transfer("t-empty", &input, &output, &config)
        .await
        .unwrap();

    assert_eq!(report.status, TransferStatus::AssembleCompleted);
    assert_eq!(report.total_chunks, 0);
    assert_eq!(std::fs::read(&output).unwrap(), b"");
}
