//! Snapshot Store: full-state checkpoints with integrity and compression
//!
//! A snapshot captures the complete state after a given journal sequence.
//! The state is bincode-encoded and its SHA-256 digest is stored next to it
//! in the file envelope, so a damaged file is detected before any byte of
//! state is trusted. Files are optionally zstd-compressed, written through
//! a temporary file plus rename, and pruned to the newest N.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Envelope format version written by this build.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Integrity check failed for {path:?}: expected {expected}, got {actual}")]
    IntegrityFailure {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsupported snapshot format version: {0}")]
    UnsupportedVersion(u32),
}

/// A decoded, integrity-checked snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    /// Last journal sequence reflected in `state`
    pub sequence: u64,
    /// Unix milliseconds
    pub taken_at: i64,
    /// Hex SHA-256 of the encoded state
    pub digest: String,
    pub state: S,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    sequence: u64,
    taken_at: i64,
    digest: [u8; 32],
    state: Vec<u8>,
}

/// Hex SHA-256 of the bincode encoding of `state`.
pub fn state_digest<S: Serialize>(state: &S) -> Result<String, SnapshotError> {
    let bytes = bincode::serialize(state).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub struct SnapshotStore {
    dir: PathBuf,
    compress: bool,
    /// Number of snapshots kept after each save (0 keeps all)
    retain: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, compress: bool, retain: usize) -> Self {
        Self {
            dir: dir.into(),
            compress,
            retain,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `state` as the snapshot for `sequence`, then prune.
    pub fn save<S: Serialize>(
        &self,
        sequence: u64,
        taken_at: i64,
        state: &S,
    ) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let encoded =
            bincode::serialize(state).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            sequence,
            taken_at,
            digest: Sha256::digest(&encoded).into(),
            state: encoded,
        };
        let mut bytes = bincode::serialize(&envelope)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        if self.compress {
            bytes = zstd::encode_all(bytes.as_slice(), ZSTD_LEVEL)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
        }

        let path = self.path_for(sequence);
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        if self.retain > 0 {
            self.prune(self.retain)?;
        }
        Ok(path)
    }

    /// Load and verify one snapshot file.
    pub fn load<S: DeserializeOwned>(&self, path: &Path) -> Result<Snapshot<S>, SnapshotError> {
        let mut bytes = fs::read(path)?;
        if is_compressed(path) {
            bytes = zstd::decode_all(bytes.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
        }
        let envelope: Envelope = bincode::deserialize(&bytes)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if envelope.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(envelope.format_version));
        }
        let actual: [u8; 32] = Sha256::digest(&envelope.state).into();
        if actual != envelope.digest {
            return Err(SnapshotError::IntegrityFailure {
                path: path.to_path_buf(),
                expected: hex::encode(envelope.digest),
                actual: hex::encode(actual),
            });
        }

        let state = bincode::deserialize(&envelope.state)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        Ok(Snapshot {
            sequence: envelope.sequence,
            taken_at: envelope.taken_at,
            digest: hex::encode(envelope.digest),
            state,
        })
    }

    /// Newest snapshot that passes verification. Damaged files are skipped
    /// with a warning so an older snapshot plus a longer replay can be used.
    pub fn load_latest<S: DeserializeOwned>(&self) -> Result<Option<Snapshot<S>>, SnapshotError> {
        for (sequence, path) in self.list()?.into_iter().rev() {
            match self.load(&path) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => {
                    tracing::warn!(sequence, path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    /// Snapshot files as `(sequence, path)`, ascending by sequence.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let sequence = name
                .strip_prefix("snapshot-")
                .and_then(|rest| {
                    rest.strip_suffix(".snap.zst")
                        .or_else(|| rest.strip_suffix(".snap"))
                })
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                out.push((sequence, entry.path()));
            }
        }
        out.sort_by_key(|(sequence, _)| *sequence);
        Ok(out)
    }

    /// Delete all but the newest `keep` snapshots. Returns removed paths.
    pub fn prune(&self, keep: usize) -> Result<Vec<PathBuf>, SnapshotError> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for (_, path) in snapshots.into_iter().take(excess) {
            fs::remove_file(&path)?;
            removed.push(path);
        }
        Ok(removed)
    }

    fn path_for(&self, sequence: u64) -> PathBuf {
        let ext = if self.compress { "snap.zst" } else { "snap" };
        self.dir.join(format!("snapshot-{:012}.{}", sequence, ext))
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "zst")
}
