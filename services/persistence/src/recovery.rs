//! Recovery Flow: boot from snapshot + journal replay
//!
//! 1. Load the newest valid snapshot, or start from the initial state
//! 2. Skip journal records the snapshot already reflects
//! 3. Replay the rest through the caller's apply function
//! 4. Truncate a torn tail left by a crash mid-append
//!
//! Replay is deterministic: any record the apply function refuses is a
//! divergence and aborts recovery.

use crate::journal::JournalRecord;
use crate::reader::{JournalReader, ReaderError};
use crate::snapshot::{SnapshotError, SnapshotStore};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Journal starts at {found} but snapshot covers up to {snapshot}")]
    MissingRecords { snapshot: u64, found: u64 },

    #[error("Replay diverged at sequence {sequence} ({kind}): {reason}")]
    Divergence {
        sequence: u64,
        kind: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State rebuilt by [`recover`] plus what it took to get there.
#[derive(Debug)]
pub struct Recovered<S> {
    pub state: S,
    /// Sequence of the last record reflected in `state` (0 if none)
    pub last_sequence: u64,
    pub snapshot_sequence: Option<u64>,
    pub replayed: u64,
    pub repaired_torn_tail: bool,
    pub elapsed_ms: u64,
}

/// Rebuild state from `snapshots` and the journal in `journal_dir`.
///
/// `initial` is used only when no snapshot can be loaded.
pub fn recover<S, F>(
    snapshots: &SnapshotStore,
    journal_dir: &Path,
    initial: impl FnOnce() -> S,
    mut apply: F,
) -> Result<Recovered<S>, RecoveryError>
where
    S: DeserializeOwned,
    F: FnMut(&mut S, &JournalRecord) -> Result<(), String>,
{
    let started = Instant::now();

    let (mut state, snapshot_sequence) = match snapshots.load_latest::<S>()? {
        Some(snapshot) => {
            tracing::info!(
                sequence = snapshot.sequence,
                digest = %snapshot.digest,
                "loaded snapshot"
            );
            (snapshot.state, Some(snapshot.sequence))
        }
        None => {
            tracing::info!("no snapshot found, starting from initial state");
            (initial(), None)
        }
    };
    let base = snapshot_sequence.unwrap_or(0);

    let mut reader = JournalReader::open(journal_dir)?;
    reader.seek_past(base)?;

    let mut last_sequence = base;
    let mut replayed = 0u64;
    while let Some(record) = reader.next_record()? {
        if record.sequence != last_sequence + 1 {
            return Err(RecoveryError::MissingRecords {
                snapshot: base,
                found: record.sequence,
            });
        }
        apply(&mut state, &record).map_err(|reason| RecoveryError::Divergence {
            sequence: record.sequence,
            kind: record.kind.clone(),
            reason,
        })?;
        last_sequence = record.sequence;
        replayed += 1;
    }

    let repaired_torn_tail = match reader.torn_tail() {
        Some(tail) => {
            tracing::warn!(
                segment = %tail.segment.display(),
                offset = tail.offset,
                bytes = tail.len,
                "truncating torn journal tail"
            );
            tail.repair()?;
            true
        }
        None => false,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(replayed, last_sequence, elapsed_ms, "recovery complete");

    Ok(Recovered {
        state,
        last_sequence,
        snapshot_sequence,
        replayed,
        repaired_torn_tail,
        elapsed_ms,
    })
}
