//! Direct-transfer driver — wires a splitter/assembler pair over a
//! `DirectChannel`, runs the split, waits (bounded) for delivery, and
//! materializes the output file.
//!
//! This is the whole lifecycle the orchestration layer otherwise runs by
//! hand; it exists so the common case is one call.

use std::path::Path;
use std::sync::Arc;

use ferry_core::{FerryConfig, TransferError, TransferStatus};

use crate::assembler::FileAssembler;
use crate::channel::{ChunkReceiver, FeedbackReceiver, TransmissionChannel};
use crate::direct::DirectChannel;
use crate::splitter::{DeliveryWait, FileSplitter};

/// Terminal outcome of one direct transfer.
#[derive(Debug)]
pub struct TransferReport {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub total_chunks: i32,
    /// Sequences that exhausted the retry budget — permanent partial
    /// failure, populated when `status` is not `AssembleCompleted`.
    pub failed_sequences: Vec<i32>,
}

/// Run one file through the in-process lossy channel and write the
/// reassembled result to `output`.
pub async fn run_direct_transfer(
    transfer_id: &str,
    input: &Path,
    output: &Path,
    config: &FerryConfig,
) -> Result<TransferReport, TransferError> {
    let channel = Arc::new(DirectChannel::from_config(&config.transfer));
    let transport: Arc<dyn TransmissionChannel> = channel.clone();

    let splitter = Arc::new(FileSplitter::new(
        transfer_id,
        transport.clone(),
        config.transfer.max_retries,
    ));
    let assembler = Arc::new(FileAssembler::new(transfer_id, transport));

    let receiver: Arc<dyn ChunkReceiver> = assembler.clone();
    let sender: Arc<dyn FeedbackReceiver> = splitter.clone();
    channel.register_assembler(&receiver);
    channel.register_splitter(&sender);

    tracing::debug!(
        transfer_id,
        status = %TransferStatus::SplitProcessing,
        "transfer starting"
    );
    splitter.split(input, config.transfer.chunk_size)?;
    tracing::debug!(transfer_id, status = %TransferStatus::SplitCompleted, "split pass done");

    channel.start_feedback_scheduler()?;
    let wait = splitter
        .wait_until_complete(config.transfer.completion_timeout())
        .await;
    channel.shutdown().await;

    let status = match wait {
        DeliveryWait::Delivered if assembler.is_file_complete() => {
            tracing::debug!(
                transfer_id,
                status = %TransferStatus::AssembleProcessing,
                "assembling output"
            );
            assembler.assemble_file(output)?;
            TransferStatus::AssembleCompleted
        }
        DeliveryWait::Delivered | DeliveryWait::Stalled => TransferStatus::AssembleFailed,
        DeliveryWait::TimedOut => TransferStatus::ProcessInterrupted,
    };

    let report = TransferReport {
        transfer_id: transfer_id.to_owned(),
        status,
        total_chunks: splitter.total_chunks(),
        failed_sequences: splitter.failed_sequences(),
    };
    tracing::info!(
        transfer_id,
        status = %report.status,
        failed = report.failed_sequences.len(),
        "transfer finished"
    );
    Ok(report)
}
