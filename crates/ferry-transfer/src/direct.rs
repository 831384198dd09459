//! In-process channel — delivers chunks straight to the registered
//! assembler with an independent per-chunk loss draw, and drives the
//! feedback cadence with a per-transfer scheduler task.
//!
//! Feedback is never dropped; feedback loss is not modeled.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use ferry_core::config::TransferConfig;
use ferry_core::{Chunk, Feedback, TransferError};
use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::channel::{ChunkReceiver, FeedbackReceiver, TransmissionChannel};

/// One direct channel per transfer. Endpoints are registered as weak
/// references: the creator of the splitter/assembler pair keeps
/// ownership, and dropping an endpoint detaches it from the channel.
pub struct DirectChannel {
    loss_probability: f64,
    feedback_interval: Duration,
    shutdown_timeout: Duration,

    assembler: RwLock<Option<Weak<dyn ChunkReceiver>>>,
    splitter: RwLock<Option<Weak<dyn FeedbackReceiver>>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl DirectChannel {
    /// Channel with the given per-chunk loss probability and default
    /// scheduler timings.
    pub fn new(loss_probability: f64) -> Self {
        let clamped = loss_probability.clamp(0.0, 1.0);
        if clamped != loss_probability {
            tracing::warn!(loss_probability, "loss probability clamped to [0, 1]");
        }
        Self {
            loss_probability: clamped,
            feedback_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(3),
            assembler: RwLock::new(None),
            splitter: RwLock::new(None),
            scheduler: Mutex::new(None),
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        let mut channel = Self::new(config.loss_probability);
        channel.feedback_interval = config.feedback_interval();
        channel.shutdown_timeout = config.scheduler_shutdown_timeout();
        channel
    }

    pub fn register_assembler(&self, assembler: &Arc<dyn ChunkReceiver>) {
        *self.assembler.write().unwrap() = Some(Arc::downgrade(assembler));
    }

    pub fn register_splitter(&self, splitter: &Arc<dyn FeedbackReceiver>) {
        *self.splitter.write().unwrap() = Some(Arc::downgrade(splitter));
    }

    fn assembler(&self) -> Result<Arc<dyn ChunkReceiver>, TransferError> {
        self.assembler
            .read()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(TransferError::EndpointNotRegistered("assembler"))
    }

    fn splitter(&self) -> Result<Arc<dyn FeedbackReceiver>, TransferError> {
        self.splitter
            .read()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(TransferError::EndpointNotRegistered("splitter"))
    }

    /// Start the periodic feedback scheduler for the registered assembler.
    /// The task stops on its own once the assembler reports complete (or
    /// is dropped); `shutdown` stops it early.
    pub fn start_feedback_scheduler(&self) -> Result<(), TransferError> {
        let mut guard = self.scheduler.lock().unwrap();
        if guard.is_some() {
            tracing::warn!("feedback scheduler already running");
            return Ok(());
        }

        // Registration must have happened; the task itself re-upgrades
        // on every tick so a dropped assembler ends the loop.
        self.assembler()?;
        let assembler = self.assembler.read().unwrap().clone().unwrap();

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let interval = self.feedback_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("feedback scheduler shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        let Some(assembler) = assembler.upgrade() else {
                            tracing::debug!("assembler dropped, feedback scheduler stopping");
                            return;
                        };
                        // Emit before the completeness check: the cycle
                        // that finds nothing missing is the one that
                        // tells the sender it is done.
                        if let Err(e) = assembler.emit_feedback() {
                            tracing::warn!(error = %e, "feedback emission failed");
                        }
                        if assembler.is_complete() {
                            tracing::debug!("transfer complete, feedback scheduler stopping");
                            return;
                        }
                    }
                }
            }
        });

        *guard = Some(SchedulerHandle {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the feedback scheduler: signal it, await its exit for the
    /// configured bound, then abort it if it has not stopped.
    pub async fn shutdown(&self) {
        let Some(SchedulerHandle {
            shutdown_tx,
            mut handle,
        }) = self.scheduler.lock().unwrap().take()
        else {
            return;
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(self.shutdown_timeout, &mut handle)
            .await
            .is_err()
        {
            tracing::warn!("feedback scheduler did not stop in time, aborting");
            handle.abort();
        }
    }
}

impl TransmissionChannel for DirectChannel {
    fn send_chunk(&self, chunk: Chunk) -> Result<(), TransferError> {
        let assembler = self.assembler()?;
        if rand::thread_rng().gen::<f64>() < self.loss_probability {
            tracing::trace!(
                transfer_id = %chunk.transfer_id,
                sequence = chunk.sequence_number,
                "chunk dropped by simulated loss"
            );
            return Ok(());
        }
        assembler.receive_chunk(chunk);
        Ok(())
    }

    fn send_feedback(&self, feedback: Feedback) -> Result<(), TransferError> {
        let splitter = self.splitter()?;
        splitter.receive_feedback(feedback);
        Ok(())
    }
}
