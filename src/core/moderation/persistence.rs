// Persistence port and the fire-and-forget write queue in front of it.
//
// The engine never waits on storage. Every ledger mutation and every piece
// of evidence becomes a `PersistCommand` pushed onto an unbounded channel;
// a single worker task drains it and applies each command with a timeout.
// A failed or timed-out write is logged and counted, never retried, and never
// touches the in-memory ledger.

use super::moderation_models::{EvidenceRecord, LedgerSnapshot, MuteRecord, ScopedKey, WarningRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Durable home for evidence, warnings and mutes.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Append-only: evidence is never updated or deleted.
    async fn append_evidence(&self, evidence: &EvidenceRecord) -> Result<(), StoreError>;

    async fn save_warning(&self, key: &ScopedKey, warning: &WarningRecord)
        -> Result<(), StoreError>;

    async fn delete_warning(&self, key: &ScopedKey, sequence_id: u64) -> Result<(), StoreError>;

    async fn clear_warnings(&self, key: &ScopedKey) -> Result<(), StoreError>;

    /// Insert or replace the mute for the key.
    async fn save_mute(&self, key: &ScopedKey, mute: &MuteRecord) -> Result<(), StoreError>;

    async fn delete_mute(&self, key: &ScopedKey) -> Result<(), StoreError>;

    /// Everything needed to rebuild the ledger at startup.
    async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistCommand {
    AppendEvidence(Box<EvidenceRecord>),
    SaveWarning {
        key: ScopedKey,
        warning: WarningRecord,
    },
    DeleteWarning {
        key: ScopedKey,
        sequence_id: u64,
    },
    ClearWarnings {
        key: ScopedKey,
    },
    SaveMute {
        key: ScopedKey,
        mute: MuteRecord,
    },
    DeleteMute {
        key: ScopedKey,
    },
}

impl PersistCommand {
    pub fn label(&self) -> &'static str {
        match self {
            PersistCommand::AppendEvidence(_) => "append_evidence",
            PersistCommand::SaveWarning { .. } => "save_warning",
            PersistCommand::DeleteWarning { .. } => "delete_warning",
            PersistCommand::ClearWarnings { .. } => "clear_warnings",
            PersistCommand::SaveMute { .. } => "save_mute",
            PersistCommand::DeleteMute { .. } => "delete_mute",
        }
    }

    pub async fn apply<S: ModerationStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        match self {
            PersistCommand::AppendEvidence(evidence) => store.append_evidence(evidence).await,
            PersistCommand::SaveWarning { key, warning } => store.save_warning(key, warning).await,
            PersistCommand::DeleteWarning { key, sequence_id } => {
                store.delete_warning(key, *sequence_id).await
            }
            PersistCommand::ClearWarnings { key } => store.clear_warnings(key).await,
            PersistCommand::SaveMute { key, mute } => store.save_mute(key, mute).await,
            PersistCommand::DeleteMute { key } => store.delete_mute(key).await,
        }
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// Write counters shared between the queue, the worker and admin commands.
#[derive(Debug, Default)]
pub struct PersistenceHealth {
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    degraded: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub applied: u64,
    pub failed: u64,
    pub dropped: u64,
    /// The most recent write failed.
    pub degraded: bool,
}

impl PersistenceHealth {
    fn record_success(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);
    }

    fn record_failure(&self) -> u64 {
        self.degraded.store(true, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// QUEUE + WORKER
// ============================================================================

/// Sending half of the write queue. `submit` never blocks and never fails.
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistCommand>,
    health: Arc<PersistenceHealth>,
}

impl PersistenceQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PersistCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            health: Arc::new(PersistenceHealth::default()),
        };
        (queue, receiver)
    }

    pub fn submit(&self, command: PersistCommand) {
        let label = command.label();
        if self.sender.send(command).is_err() {
            let dropped = self.health.record_dropped();
            tracing::warn!(command = label, dropped, "Persistence worker is gone; write dropped");
        }
    }

    pub fn health(&self) -> Arc<PersistenceHealth> {
        Arc::clone(&self.health)
    }
}

/// Drain the queue until every sender is gone.
pub async fn run_persistence_worker<S: ModerationStore + ?Sized>(
    store: Arc<S>,
    mut receiver: mpsc::UnboundedReceiver<PersistCommand>,
    write_timeout: Duration,
    health: Arc<PersistenceHealth>,
) {
    tracing::info!("Moderation persistence worker started");

    while let Some(command) = receiver.recv().await {
        let result = tokio::time::timeout(write_timeout, command.apply(store.as_ref())).await;

        match result {
            Ok(Ok(())) => health.record_success(),
            Ok(Err(e)) => {
                let failures = health.record_failure();
                tracing::warn!(
                    command = command.label(),
                    error = %e,
                    failures,
                    "Moderation write failed; continuing in degraded mode"
                );
            }
            Err(_) => {
                let failures = health.record_failure();
                tracing::warn!(
                    command = command.label(),
                    timeout_ms = write_timeout.as_millis() as u64,
                    failures,
                    "Moderation write timed out; continuing in degraded mode"
                );
            }
        }
    }

    tracing::info!("Moderation persistence worker stopped");
}
