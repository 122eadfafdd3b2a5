//! Journal Reader: sequential replay with integrity checks
//!
//! Reads every segment in index order and validates each record's CRC32C
//! and that sequences run without gaps. A frame cut short at the very end
//! of the newest segment is the signature of a crash mid-append; it is
//! reported as a torn tail instead of an error and can be truncated away
//! with [`TornTail::repair`]. Anything else that fails to decode is
//! corruption and stops the read.

use crate::journal::{list_segments, FrameError, JournalRecord};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch in {segment:?} at offset {offset}: seq={sequence}")]
    ChecksumMismatch {
        segment: PathBuf,
        offset: u64,
        sequence: u64,
    },

    #[error("Corruption in {segment:?} at offset {offset}: {detail}")]
    Corruption {
        segment: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

/// Unreadable bytes at the end of the newest segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    pub segment: PathBuf,
    /// Length of the valid prefix
    pub offset: u64,
    /// Bytes past the valid prefix
    pub len: u64,
}

impl TornTail {
    /// Truncate the segment back to its last complete record.
    pub fn repair(&self) -> Result<(), io::Error> {
        let file = OpenOptions::new().write(true).open(&self.segment)?;
        file.set_len(self.offset)?;
        file.sync_all()
    }
}

pub struct JournalReader {
    segments: Vec<PathBuf>,
    /// Index into `segments` of the loaded segment
    current: usize,
    data: Vec<u8>,
    pos: usize,
    last_sequence: Option<u64>,
    torn_tail: Option<TornTail>,
}

impl JournalReader {
    /// Open a reader over all segments in `dir`. A missing directory reads
    /// as an empty journal.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let segments: Vec<PathBuf> = list_segments(dir)?.into_iter().map(|(_, p)| p).collect();
        let data = match segments.first() {
            Some(path) => fs::read(path)?,
            None => Vec::new(),
        };
        Ok(Self {
            segments,
            current: 0,
            data,
            pos: 0,
            last_sequence: None,
            torn_tail: None,
        })
    }

    /// Next valid record, or `None` at the end of the journal.
    pub fn next_record(&mut self) -> Result<Option<JournalRecord>, ReaderError> {
        loop {
            if self.pos >= self.data.len() {
                if !self.advance()? {
                    return Ok(None);
                }
                continue;
            }

            let offset = self.pos as u64;
            match JournalRecord::decode(&self.data[self.pos..]) {
                Ok((record, used)) => {
                    if !record.verify_checksum() {
                        return Err(ReaderError::ChecksumMismatch {
                            segment: self.segment().to_path_buf(),
                            offset,
                            sequence: record.sequence,
                        });
                    }
                    if let Some(last) = self.last_sequence {
                        if record.sequence != last + 1 {
                            return Err(ReaderError::SequenceGap {
                                expected: last + 1,
                                got: record.sequence,
                            });
                        }
                    }
                    self.pos += used;
                    self.last_sequence = Some(record.sequence);
                    return Ok(Some(record));
                }
                Err(FrameError::Incomplete { .. }) if self.is_last_segment() => {
                    self.torn_tail = Some(TornTail {
                        segment: self.segment().to_path_buf(),
                        offset,
                        len: (self.data.len() - self.pos) as u64,
                    });
                    self.pos = self.data.len();
                    return Ok(None);
                }
                Err(e) => {
                    return Err(ReaderError::Corruption {
                        segment: self.segment().to_path_buf(),
                        offset,
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<JournalRecord>, ReaderError> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    /// Skip every record with `sequence <= sequence`. Returns how many
    /// records were skipped.
    pub fn seek_past(&mut self, sequence: u64) -> Result<u64, ReaderError> {
        let mut skipped = 0;
        loop {
            if self.last_sequence.is_some_and(|last| last >= sequence) {
                return Ok(skipped);
            }
            let checkpoint = (self.current, self.pos, self.last_sequence);
            match self.next_record()? {
                Some(record) if record.sequence <= sequence => skipped += 1,
                Some(_) => {
                    // first record past the target: leave it unread
                    (self.current, self.pos, self.last_sequence) = checkpoint;
                    self.reload()?;
                    return Ok(skipped);
                }
                None => return Ok(skipped),
            }
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn torn_tail(&self) -> Option<&TornTail> {
        self.torn_tail.as_ref()
    }

    fn segment(&self) -> &Path {
        &self.segments[self.current]
    }

    fn is_last_segment(&self) -> bool {
        self.current + 1 == self.segments.len()
    }

    fn advance(&mut self) -> Result<bool, ReaderError> {
        if self.current + 1 >= self.segments.len() {
            return Ok(false);
        }
        self.current += 1;
        self.data = fs::read(&self.segments[self.current])?;
        self.pos = 0;
        Ok(true)
    }

    fn reload(&mut self) -> Result<(), ReaderError> {
        if let Some(path) = self.segments.get(self.current) {
            self.data = fs::read(path)?;
        }
        Ok(())
    }
}
