//! Journal Writer: append-only log of committed operations
//!
//! The journal is split into numbered segment files. Each record is one
//! self-delimiting frame:
//!
//! ```text
//! [frame_len:   u32]   // bytes that follow, checksum included
//! [sequence:    u64]
//! [recorded_at: i64]   // unix milliseconds
//! [kind_len:    u8 ][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum:    u32]   // CRC32C over everything between frame_len and checksum
//! ```
//!
//! All integers are little-endian. Sequences start at 1 and are assigned
//! by the writer, so a journal is gapless by construction.
//!
//! A failed append is cut back out of the segment, buffered or on disk,
//! and its sequence is handed out again. If the cut itself fails the
//! writer is poisoned and refuses further writes.

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Frames larger than this are treated as corruption when decoding.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const FIXED_BODY_LEN: usize = 8 + 8 + 1 + 4 + 4;
const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".wal";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Record kind too long: {0} bytes")]
    KindTooLong(usize),

    #[error("Record payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Journal writer poisoned by an earlier unrecoverable write failure")]
    Poisoned,
}

/// Why a byte slice could not be decoded into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The slice ends before the frame does.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

// ── Record ──────────────────────────────────────────────────────────

/// One journaled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub sequence: u64,
    pub recorded_at: i64,
    /// Operation name, for diagnostics only
    pub kind: String,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl JournalRecord {
    pub fn new(sequence: u64, recorded_at: i64, kind: impl Into<String>, payload: Vec<u8>) -> Self {
        let mut record = Self {
            sequence,
            recorded_at,
            kind: kind.into(),
            payload,
            checksum: 0,
        };
        record.checksum = crc32c(&record.encode_body());
        record
    }

    pub fn verify_checksum(&self) -> bool {
        crc32c(&self.encode_body()) == self.checksum
    }

    /// Frame bytes as written to disk.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let frame_len = (body.len() + 4) as u32;
        let mut out = Vec::with_capacity(4 + body.len() + 4);
        out.extend_from_slice(&frame_len.to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(FIXED_BODY_LEN + self.kind.len() + self.payload.len());
        body.extend_from_slice(&self.sequence.to_le_bytes());
        body.extend_from_slice(&self.recorded_at.to_le_bytes());
        body.push(self.kind.len() as u8);
        body.extend_from_slice(self.kind.as_bytes());
        body.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.payload);
        body
    }

    /// Decode the frame at the start of `data`, returning the record and
    /// the number of bytes it occupied. The checksum is not verified here.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let mut head = Cursor::new(data);
        let frame_len = head.u32()? as usize;
        if !(FIXED_BODY_LEN..=MAX_FRAME_LEN).contains(&frame_len) {
            return Err(FrameError::Malformed(format!(
                "implausible frame length {}",
                frame_len
            )));
        }
        let frame = head.take(frame_len)?;

        let mut c = Cursor::new(frame);
        let sequence = c.u64()?;
        let recorded_at = c.i64()?;
        let kind_len = c.u8()? as usize;
        let kind = String::from_utf8(c.take(kind_len)?.to_vec())
            .map_err(|e| FrameError::Malformed(format!("kind is not utf-8: {}", e)))?;
        let payload_len = c.u32()? as usize;
        let payload = c.take(payload_len)?.to_vec();
        let checksum = c.u32()?;
        if c.remaining() != 0 {
            return Err(FrameError::Malformed(format!(
                "{} trailing bytes inside frame",
                c.remaining()
            )));
        }

        Ok((
            Self {
                sequence,
                recorded_at,
                kind,
                payload,
                checksum,
            },
            4 + frame_len,
        ))
    }
}

/// Bounds-checked little-endian reader over a byte slice.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if self.remaining() < n {
            return Err(FrameError::Incomplete {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, FrameError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, FrameError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, FrameError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// When buffered bytes are handed to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// When the segment is fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    /// Only when a segment is sealed or on explicit `sync`
    OnRotation,
}

// ── Writer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub dir: PathBuf,
    /// Segment size that triggers rotation (default 64 MiB)
    pub max_segment_bytes: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_segment_bytes: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    segment_index: u64,
    segment_path: PathBuf,
    segment_bytes: u64,
    next_sequence: u64,
    unflushed: usize,
    unsynced: usize,
    poisoned: bool,
    /// Fail the next fsync once
    #[cfg(test)]
    pub(crate) fail_next_fsync: bool,
}

impl JournalWriter {
    /// Open the newest segment for appending. `last_sequence` is the
    /// sequence of the last record already in the journal (0 if empty).
    pub fn open(config: JournalConfig, last_sequence: u64) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;
        let segment_index = list_segments(&config.dir)?
            .last()
            .map(|(index, _)| *index)
            .unwrap_or(0);
        let segment_path = segment_path(&config.dir, segment_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&segment_path)?;
        let segment_bytes = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            segment_index,
            segment_path,
            segment_bytes,
            next_sequence: last_sequence + 1,
            unflushed: 0,
            unsynced: 0,
            poisoned: false,
            #[cfg(test)]
            fail_next_fsync: false,
        })
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn segment_path(&self) -> &Path {
        &self.segment_path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append a record under the next sequence number.
    ///
    /// On error the segment holds exactly what it held before the call and
    /// the sequence number is not consumed.
    pub fn append(
        &mut self,
        kind: &str,
        payload: Vec<u8>,
        recorded_at: i64,
    ) -> Result<JournalRecord, JournalError> {
        if self.poisoned {
            return Err(JournalError::Poisoned);
        }
        if kind.len() > u8::MAX as usize {
            return Err(JournalError::KindTooLong(kind.len()));
        }
        if payload.len() + FIXED_BODY_LEN + kind.len() > MAX_FRAME_LEN {
            return Err(JournalError::PayloadTooLarge(payload.len()));
        }
        if self.segment_bytes >= self.config.max_segment_bytes {
            self.rotate()?;
        }

        let record = JournalRecord::new(self.next_sequence, recorded_at, kind, payload);
        let frame = record.encode();
        let start = self.segment_bytes;
        if let Err(e) = self.write_frame(&frame) {
            if let Err(cut) = self.truncate_to(start) {
                tracing::error!(
                    segment = %self.segment_path.display(),
                    error = %cut,
                    "failed to remove partial journal record, writer poisoned"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.segment_bytes += frame.len() as u64;
        self.next_sequence += 1;
        Ok(record)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame)?;
        let unflushed = self.unflushed + 1;
        let unsynced = self.unsynced + 1;

        let flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => unflushed >= n,
        };
        let fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => unsynced >= n,
            FsyncPolicy::OnRotation => false,
        };
        if flush || fsync {
            self.writer.flush()?;
        }
        if fsync {
            self.sync_data()?;
        }

        self.unflushed = if flush || fsync { 0 } else { unflushed };
        self.unsynced = if fsync { 0 } else { unsynced };
        Ok(())
    }

    fn sync_data(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_fsync) {
            return Err(io::Error::other("injected fsync failure"));
        }
        self.writer.get_ref().sync_data()
    }

    /// Cut the segment back to its first `len` bytes.
    ///
    /// The buffered writer only ever hands a prefix of its stream to the
    /// file, so the segment is the bytes on disk followed by the buffer.
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (file, buffered) = stale.into_parts();
        let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = file.metadata()?.len();
        if on_disk > len {
            file.set_len(len)?;
            file.sync_all()?;
        } else {
            let keep = usize::try_from(len - on_disk).map_err(io::Error::other)?;
            let kept = buffered
                .get(..keep)
                .ok_or_else(|| io::Error::other("journal segment shorter than expected"))?;
            self.writer.write_all(kept)?;
        }
        Ok(())
    }

    /// Flush and fsync everything written so far.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        if self.poisoned {
            return Err(JournalError::Poisoned);
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.unflushed = 0;
        self.unsynced = 0;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;
        self.segment_index += 1;
        self.segment_path = segment_path(&self.config.dir, self.segment_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.segment_path)?;
        self.writer = BufWriter::new(file);
        self.segment_bytes = 0;
        Ok(())
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if !self.poisoned {
            let _ = self.writer.flush();
        }
    }
}

// ── Segment files ───────────────────────────────────────────────────

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{}{:08}{}", SEGMENT_PREFIX, index, SEGMENT_SUFFIX))
}

/// Segment files in `dir` as `(index, path)`, ascending.
pub fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>, io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let index = name
            .strip_prefix(SEGMENT_PREFIX)
            .and_then(|rest| rest.strip_suffix(SEGMENT_SUFFIX))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(index) = index {
            segments.push((index, entry.path()));
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn record(seq: u64) -> JournalRecord {
        JournalRecord::new(seq, 1_760_000_000_000 + seq as i64, "deposit", vec![1, 2, 3, 4])
    }

    #[test]
    fn test_checksum_detects_tamper() {
        let mut r = record(1);
        assert!(r.verify_checksum());
        r.payload[0] ^= 0xff;
        assert!(!r.verify_checksum());
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let mut bytes = record(7).encode();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&record(8).encode());

        let (decoded, used) = JournalRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record(7));
        assert_eq!(used, frame_len);
        let (next, _) = JournalRecord::decode(&bytes[used..]).unwrap();
        assert_eq!(next.sequence, 8);
    }

    #[test]
    fn test_decode_truncated_frame_is_incomplete() {
        let bytes = record(1).encode();
        for cut in [0, 3, 4, 10, bytes.len() - 1] {
            assert!(
                matches!(
                    JournalRecord::decode(&bytes[..cut]),
                    Err(FrameError::Incomplete { .. })
                ),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_decode_rejects_implausible_length() {
        let mut bytes = record(1).encode();
        bytes[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            JournalRecord::decode(&bytes),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_writer_assigns_sequences_from_one() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 0).unwrap();
        let first = writer.append("mint", vec![], 1).unwrap();
        let second = writer.append("deposit", vec![9], 2).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(writer.last_sequence(), 2);
    }

    #[test]
    fn test_writer_resumes_after_last_sequence() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 41).unwrap();
        assert_eq!(writer.append("mint", vec![], 1).unwrap().sequence, 42);
    }

    #[test]
    fn test_reopen_appends_to_latest_segment() {
        let tmp = TempDir::new().unwrap();
        {
            let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 0).unwrap();
            writer.append("mint", vec![1], 1).unwrap();
        }
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 1).unwrap();
        writer.append("mint", vec![2], 2).unwrap();
        writer.sync().unwrap();
        assert_eq!(list_segments(tmp.path()).unwrap().len(), 1);

        let bytes = fs::read(writer.segment_path()).unwrap();
        let (first, used) = JournalRecord::decode(&bytes).unwrap();
        let (second, rest) = JournalRecord::decode(&bytes[used..]).unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(used + rest, bytes.len());
    }

    #[test]
    fn test_rotation_creates_segments() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            max_segment_bytes: 64,
            ..JournalConfig::new(tmp.path())
        };
        let mut writer = JournalWriter::open(config, 0).unwrap();
        for i in 0..10 {
            writer.append("deposit", vec![i; 16], i as i64).unwrap();
        }
        let segments = list_segments(tmp.path()).unwrap();
        assert!(segments.len() > 1);
        let indexes: Vec<u64> = segments.iter().map(|(i, _)| *i).collect();
        let mut sorted = indexes.clone();
        sorted.sort();
        assert_eq!(indexes, sorted);
    }

    #[test]
    fn test_sync_with_lazy_policies() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            flush_policy: FlushPolicy::EveryN(1000),
            fsync_policy: FsyncPolicy::OnRotation,
            ..JournalConfig::new(tmp.path())
        };
        let mut writer = JournalWriter::open(config, 0).unwrap();
        writer.append("mint", vec![1], 1).unwrap();
        assert_eq!(fs::metadata(writer.segment_path()).unwrap().len(), 0);
        writer.sync().unwrap();
        assert!(fs::metadata(writer.segment_path()).unwrap().len() > 0);
    }

    #[test]
    fn test_kind_length_limit() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 0).unwrap();
        let kind = "k".repeat(256);
        assert!(matches!(
            writer.append(&kind, vec![], 0),
            Err(JournalError::KindTooLong(256))
        ));
        assert_eq!(writer.next_sequence(), 1);
    }

    #[test]
    fn test_failed_fsync_removes_record() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 0).unwrap();
        writer.append("mint", vec![1], 1).unwrap();
        let len_before = fs::metadata(writer.segment_path()).unwrap().len();

        writer.fail_next_fsync = true;
        assert!(matches!(
            writer.append("deposit", vec![2; 32], 2),
            Err(JournalError::Io(_))
        ));
        assert!(!writer.is_poisoned());
        assert_eq!(writer.next_sequence(), 2);
        assert_eq!(fs::metadata(writer.segment_path()).unwrap().len(), len_before);

        let retried = writer.append("deposit", vec![3], 3).unwrap();
        assert_eq!(retried.sequence, 2);
        drop(writer);

        let records = crate::reader::JournalReader::open(tmp.path())
            .unwrap()
            .read_all()
            .unwrap();
        let seqs: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(records[1].payload, vec![3]);
    }

    #[test]
    fn test_failed_fsync_keeps_buffered_records() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            flush_policy: FlushPolicy::EveryN(1000),
            fsync_policy: FsyncPolicy::EveryN(2),
            ..JournalConfig::new(tmp.path())
        };
        let mut writer = JournalWriter::open(config, 0).unwrap();
        writer.append("mint", vec![1], 1).unwrap();

        writer.fail_next_fsync = true;
        assert!(writer.append("mint", vec![2], 2).is_err());
        writer.append("mint", vec![4], 4).unwrap();
        writer.sync().unwrap();

        let records = crate::reader::JournalReader::open(tmp.path())
            .unwrap()
            .read_all()
            .unwrap();
        let payloads: Vec<(u64, Vec<u8>)> =
            records.into_iter().map(|r| (r.sequence, r.payload)).collect();
        assert_eq!(payloads, vec![(1, vec![1]), (2, vec![4])]);
    }

    #[test]
    fn test_poisoned_writer_refuses_writes() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JournalWriter::open(JournalConfig::new(tmp.path()), 0).unwrap();
        writer.poisoned = true;
        assert!(matches!(
            writer.append("mint", vec![], 1),
            Err(JournalError::Poisoned)
        ));
        assert!(matches!(writer.sync(), Err(JournalError::Poisoned)));
        assert_eq!(writer.next_sequence(), 1);
    }

    #[test]
    fn test_segment_naming() {
        assert_eq!(
            segment_path(Path::new("/data"), 3),
            PathBuf::from("/data/segment-00000003.wal")
        );
    }

    proptest! {
        #[test]
        fn fuzz_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = JournalRecord::decode(&bytes);
        }

        #[test]
        fn fuzz_encode_decode_agree(
            seq in any::<u64>(),
            at in any::<i64>(),
            payload in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            let r = JournalRecord::new(seq, at, "withdrawRequest", payload);
            let (decoded, used) = JournalRecord::decode(&r.encode()).unwrap();
            prop_assert_eq!(used, r.encode().len());
            prop_assert!(decoded.verify_checksum());
            prop_assert_eq!(decoded, r);
        }
    }
}
