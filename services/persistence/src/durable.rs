//! Durable ledger
//!
//! Wraps a [`Ledger`] so that every committed operation is journaled before
//! the caller sees its receipt. Rejected operations change nothing and
//! leave no trace in the journal. On open, the ledger is rebuilt from the
//! newest snapshot plus the journal tail.

use chrono::Utc;
use escrow_contracts::{ContractError, Ledger, Operation, Receipt};
use escrow_types::ids::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::journal::{FsyncPolicy, JournalConfig, JournalError, JournalWriter};
use crate::recovery::{recover, RecoveryError};
use crate::snapshot::{SnapshotError, SnapshotStore};

#[derive(Error, Debug)]
pub enum DurableError {
    /// The contract refused the operation; nothing was persisted.
    #[error(transparent)]
    Rejected(#[from] ContractError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone)]
pub struct DurableConfig {
    pub data_dir: PathBuf,
    /// Committed operations between automatic snapshots (0 disables)
    pub snapshot_every: u64,
    pub compress_snapshots: bool,
    pub retain_snapshots: usize,
    pub fsync_policy: FsyncPolicy,
}

impl DurableConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            snapshot_every: 1_000,
            compress_snapshots: true,
            retain_snapshots: 3,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }

    fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

/// Journal payload: who called and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournaledCall {
    pub caller: Address,
    pub operation: Operation,
}

pub struct DurableLedger {
    ledger: Ledger,
    journal: JournalWriter,
    snapshots: SnapshotStore,
    snapshot_every: u64,
    since_snapshot: u64,
}

impl DurableLedger {
    /// Open the ledger stored under `config.data_dir`.
    ///
    /// `genesis` builds the freshly deployed ledger and is only called when
    /// nothing has been persisted yet; its result is snapshotted at
    /// sequence 0 right away so later boots never depend on it.
    pub fn open(config: DurableConfig, genesis: impl FnOnce() -> Ledger) -> Result<Self, DurableError> {
        let snapshots = SnapshotStore::new(
            config.snapshot_dir(),
            config.compress_snapshots,
            config.retain_snapshots,
        );
        let journal_dir = config.journal_dir();

        let recovered = recover(&snapshots, &journal_dir, genesis, |ledger: &mut Ledger, record| {
            let call: JournaledCall =
                bincode::deserialize(&record.payload).map_err(|e| e.to_string())?;
            ledger
                .execute(call.caller, &call.operation)
                .map(|_| ())
                .map_err(|e| format!("{} ({})", e, e.code()))
        })?;

        if recovered.snapshot_sequence.is_none() && recovered.last_sequence == 0 {
            snapshots.save(0, Utc::now().timestamp_millis(), &recovered.state)?;
            info!(contract = %recovered.state.contract().address(), "initialized new ledger");
        }

        let journal = JournalWriter::open(
            JournalConfig {
                fsync_policy: config.fsync_policy,
                ..JournalConfig::new(journal_dir)
            },
            recovered.last_sequence,
        )?;

        info!(
            last_sequence = recovered.last_sequence,
            replayed = recovered.replayed,
            "ledger opened"
        );

        Ok(Self {
            ledger: recovered.state,
            journal,
            snapshots,
            snapshot_every: config.snapshot_every,
            since_snapshot: recovered.replayed,
        })
    }

    /// Execute and persist one operation.
    ///
    /// The operation stays staged in memory until its journal record is
    /// written; if the append fails it is rolled back and neither memory
    /// nor disk sees it.
    pub fn execute(&mut self, caller: Address, operation: Operation) -> Result<Receipt, DurableError> {
        let call = JournaledCall { caller, operation };
        let payload =
            bincode::serialize(&call).map_err(|e| DurableError::Encoding(e.to_string()))?;

        let staged = match self.ledger.stage(call.caller, &call.operation) {
            Ok(staged) => staged,
            Err(e) => {
                debug!(op = call.operation.name(), caller = %caller, code = e.code(), "operation rejected");
                return Err(e.into());
            }
        };

        let record = match self.journal.append(
            call.operation.name(),
            payload,
            Utc::now().timestamp_millis(),
        ) {
            Ok(record) => record,
            Err(e) => {
                drop(staged);
                warn!(op = call.operation.name(), error = %e, "journal append failed, operation undone");
                return Err(e.into());
            }
        };
        let receipt = staged.commit();
        debug!(
            sequence = record.sequence,
            op = %record.kind,
            caller = %caller,
            events = receipt.events.len(),
            "operation committed"
        );

        self.since_snapshot += 1;
        if self.snapshot_every > 0 && self.since_snapshot >= self.snapshot_every {
            if let Err(e) = self.snapshot() {
                warn!(error = %e, "periodic snapshot failed");
            }
        }
        Ok(receipt)
    }

    /// Snapshot the current state at the last journaled sequence.
    pub fn snapshot(&mut self) -> Result<PathBuf, DurableError> {
        self.journal.sync()?;
        let sequence = self.journal.last_sequence();
        let path = self
            .snapshots
            .save(sequence, Utc::now().timestamp_millis(), &self.ledger)?;
        self.since_snapshot = 0;
        info!(sequence, path = %path.display(), "snapshot written");
        Ok(path)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn last_sequence(&self) -> u64 {
        self.journal.last_sequence()
    }

    /// Flush the journal to disk.
    pub fn sync(&mut self) -> Result<(), DurableError> {
        self.journal.sync()?;
        Ok(())
    }
}
