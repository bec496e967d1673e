//! Append-only log of slot events.
//!
//! Record layout: `[u32 le: payload len][bincode Event][u32 le: crc32(payload)]`.
//! Writers stage records with [`Wal::append_buffered`] and make them durable
//! with [`Wal::commit`]. A commit that fails cuts the file back to the last
//! committed length, so no part of a failed batch is replayed later.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const HEADER_LEN: usize = 4;
const TRAILER_LEN: usize = 4;

pub struct Wal {
    file: File,
    path: PathBuf,
    /// Encoded records not yet on disk.
    pending: Vec<u8>,
    pending_records: u64,
    /// File length covering only fully committed batches.
    committed_len: u64,
    appends_since_compact: u64,
    /// Set when a rollback could not truncate; every later commit fails.
    poisoned: bool,
}

/// What a scan of a log file found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the readable prefix.
    pub valid_len: u64,
    /// Bytes after the readable prefix: a torn or corrupt tail.
    pub discarded: u64,
}

fn encode_record(buf: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL record too large"))?;
    buf.reserve(HEADER_LEN + payload.len() + TRAILER_LEN);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Decode the record at the front of `buf`. `None` when it is incomplete,
/// fails its checksum, or does not deserialize.
fn decode_record(buf: &[u8]) -> Option<(Event, usize)> {
    let len = u32::from_le_bytes(buf.get(..HEADER_LEN)?.try_into().ok()?) as usize;
    let end = HEADER_LEN.checked_add(len)?;
    let payload = buf.get(HEADER_LEN..end)?;
    let crc = u32::from_le_bytes(buf.get(end..end + TRAILER_LEN)?.try_into().ok()?);
    if crc != crc32fast::hash(payload) {
        return None;
    }
    let event = bincode::deserialize(payload).ok()?;
    Some((event, end + TRAILER_LEN))
}

fn compact_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

impl Wal {
    /// Replay the log at `path` (creating it if missing), cut off any
    /// unreadable tail, and open it for appending.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if replay.discarded > 0 {
            tracing::warn!(
                "{}: dropping {} unreadable tail bytes after {} records",
                path.display(),
                replay.discarded,
                replay.events.len()
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_records: 0,
            committed_len: replay.valid_len,
            appends_since_compact: 0,
            poisoned: false,
        };
        Ok((wal, replay.events))
    }

    /// Scan a log without modifying it. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        let mut offset = 0;
        while let Some((event, used)) = decode_record(&bytes[offset..]) {
            events.push(event);
            offset += used;
        }
        Ok(Replay {
            events,
            valid_len: offset as u64,
            discarded: (bytes.len() - offset) as u64,
        })
    }

    /// Stage one record for the next commit.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.pending, event)?;
        self.pending_records += 1;
        Ok(())
    }

    /// Write and fsync every staged record as one batch. On error the batch
    /// is gone from memory and disk.
    pub fn commit(&mut self) -> io::Result<()> {
        if self.poisoned {
            self.discard_pending();
            return Err(io::Error::other(
                "WAL is unusable: an earlier rollback could not truncate it",
            ));
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        match self.write_pending() {
            Ok(()) => {
                self.committed_len += self.pending.len() as u64;
                self.appends_since_compact += self.pending_records;
                self.discard_pending();
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn write_pending(&mut self) -> io::Result<()> {
        #[cfg(test)]
        {
            if failpoint::take(&self.path) {
                let half = self.pending.len() / 2;
                self.file.write_all(&self.pending[..half])?;
                return Err(io::Error::other("injected write failure"));
            }
        }
        self.file.write_all(&self.pending)?;
        self.file.sync_all()
    }

    /// Drop the staged batch and truncate anything it left on disk.
    pub fn rollback(&mut self) {
        self.discard_pending();
        let truncated = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = truncated {
            tracing::error!(
                "{}: rollback to {} bytes failed: {e}",
                self.path.display(),
                self.committed_len
            );
            self.poisoned = true;
        }
    }

    fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_records = 0;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write `events` to the side file that [`Wal::swap_compact_file`]
    /// installs. Leaves the live log untouched.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut buf = Vec::new();
        for event in events {
            encode_record(&mut buf, event)?;
        }
        let mut tmp = File::create(compact_path(path))?;
        tmp.write_all(&buf)?;
        tmp.sync_all()
    }

    /// Rename the side file over the live log and append to it from now on.
    /// The compacted file reflects in-memory state, so it also clears poison.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_path(&self.path), &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        self.poisoned = false;
        self.discard_pending();
        Ok(())
    }
}
