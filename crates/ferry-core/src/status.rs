//! Transfer status — the value the core hands to the orchestration layer.

use serde::{Deserialize, Serialize};

/// Lifecycle status of one transfer, as reported to whichever layer owns
/// the transfer record. The core only produces these; it never reads
/// them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Created,
    SplitProcessing,
    SplitFailed,
    SplitCompleted,
    AssembleProcessing,
    AssembleFailed,
    AssembleCompleted,
    ProcessInterrupted,
}

impl TransferStatus {
    /// Terminal statuses end the transfer's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::SplitFailed
                | TransferStatus::AssembleFailed
                | TransferStatus::AssembleCompleted
                | TransferStatus::ProcessInterrupted
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStatus::Created => "CREATED",
            TransferStatus::SplitProcessing => "SPLIT_PROCESSING",
            TransferStatus::SplitFailed => "SPLIT_FAILED",
            TransferStatus::SplitCompleted => "SPLIT_COMPLETED",
            TransferStatus::AssembleProcessing => "ASSEMBLE_PROCESSING",
            TransferStatus::AssembleFailed => "ASSEMBLE_FAILED",
            TransferStatus::AssembleCompleted => "ASSEMBLE_COMPLETED",
            TransferStatus::ProcessInterrupted => "PROCESS_INTERRUPTED",
        };
        f.write_str(s)
    }
}
