//! Per-transfer registries — map a transfer id to its live splitter or
//! assembler so a shared consuming process can route inbound messages to
//! the right state machine.
//!
//! Registries are constructed once and passed by handle; they are cheap
//! to clone and DashMap keeps lookups for unrelated transfers from
//! contending. The broker-backed transport requires them; the direct
//! variant does not (the creator holds its endpoints by reference).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::assembler::FileAssembler;
use crate::splitter::FileSplitter;

/// Live sender-side instances, keyed by transfer id.
#[derive(Clone, Default)]
pub struct SplitterRegistry {
    inner: Arc<DashMap<String, Arc<FileSplitter>>>,
}

impl SplitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a splitter under its transfer id.
    pub fn insert(&self, splitter: Arc<FileSplitter>) {
        self.inner
            .insert(splitter.transfer_id().to_owned(), splitter);
    }

    pub fn get(&self, transfer_id: &str) -> Option<Arc<FileSplitter>> {
        self.inner.get(transfer_id).map(|e| e.value().clone())
    }

    pub fn get_or_create(
        &self,
        transfer_id: &str,
        factory: impl FnOnce(&str) -> Arc<FileSplitter>,
    ) -> Arc<FileSplitter> {
        self.inner
            .entry(transfer_id.to_owned())
            .or_insert_with(|| factory(transfer_id))
            .value()
            .clone()
    }

    /// Evict a resolved transfer. Required to bound memory growth.
    pub fn remove(&self, transfer_id: &str) -> Option<Arc<FileSplitter>> {
        self.inner.remove(transfer_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Live receiver-side instances, keyed by transfer id.
#[derive(Clone, Default)]
pub struct AssemblerRegistry {
    inner: Arc<DashMap<String, Arc<FileAssembler>>>,
}

impl AssemblerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, assembler: Arc<FileAssembler>) {
        self.inner
            .insert(assembler.transfer_id().to_owned(), assembler);
    }

    pub fn get(&self, transfer_id: &str) -> Option<Arc<FileAssembler>> {
        self.inner.get(transfer_id).map(|e| e.value().clone())
    }

    /// Return the assembler for a transfer, constructing it on first use.
    /// This is how the shared chunk consumer admits transfers it has
    /// never seen before.
    pub fn get_or_create(
        &self,
        transfer_id: &str,
        factory: impl FnOnce(&str) -> Arc<FileAssembler>,
    ) -> Arc<FileAssembler> {
        self.inner
            .entry(transfer_id.to_owned())
            .or_insert_with(|| factory(transfer_id))
            .value()
            .clone()
    }

    pub fn remove(&self, transfer_id: &str) -> Option<Arc<FileAssembler>> {
        self.inner.remove(transfer_id).map(|(_, a)| a)
    }

    /// Remove assemblers that have seen no activity for `max_idle`.
    /// Reclaims transfers abandoned mid-flight (e.g. a straggler chunk
    /// admitted an assembler whose metadata never arrived).
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.inner.len();
        self.inner.retain(|transfer_id, assembler| {
            let stale = assembler.idle_for() > max_idle;
            if stale {
                tracing::warn!(transfer_id = %transfer_id, "removing idle assembler");
            }
            !stale
        });
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
