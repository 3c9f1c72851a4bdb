/*
    commit_log.rs - Durable local copy of the append log

    Every entry a replica admits (local or merged) is written here so that
    `load` can rehydrate the store after a restart.

    Frame layout (little endian):
    [seq:8][timestamp:8][len:4][data:len][crc32:4]

    `data` is a JSON-encoded LogEntry. A frame cut short by a crash at the
    tail of the file is ignored; a checksum mismatch is corruption.

    Each (origin, seq) is written at most once.
*/

use crate::core_store::model::{now_millis, PeerId};
use crate::core_store::store::append_log::LogEntry;
use crate::core_store::store::errors::{StoreError, StoreResult};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Frame header and trailer size in bytes
const FRAME_OVERHEAD: usize = 8 + 8 + 4 + 4;

/// Largest payload a frame may declare
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A raw frame of the commit log
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub timestamp: u64,
    pub data: Vec<u8>,
    pub checksum: u32,
}

impl Frame {
    pub fn new(seq: u64, timestamp: u64, data: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&data);
        Frame { seq, timestamp, data, checksum }
    }

    pub fn verify_checksum(&self) -> bool {
        crc32fast::hash(&self.data) == self.checksum
    }
}

/// Append-only file of log entries
pub struct CommitLog {
    path: PathBuf,
    file: BufWriter<File>,
    seq: u64,
    size: usize,

    /// Entries already on disk
    persisted: HashSet<(PeerId, u64)>,
}

impl CommitLog {
    /// Create or open a commit log
    pub fn open(path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let size = file.metadata()?.len() as usize;

        let mut log = CommitLog {
            path,
            file: BufWriter::new(file),
            seq: 0,
            size,
            persisted: HashSet::new(),
        };
        let frames = log.read_frames()?;
        let valid: usize = frames.iter().map(|f| FRAME_OVERHEAD + f.data.len()).sum();
        if valid < log.size {
            // Drop the torn tail so new frames are not written after garbage
            log.file.get_ref().set_len(valid as u64)?;
            log.size = valid;
        }
        log.seq = frames.len() as u64;
        log.persisted = log
            .decode(&frames)
            .into_iter()
            .map(|entry| (entry.origin, entry.seq))
            .collect();
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the entry `(origin, seq)` is already on disk
    pub fn contains(&self, origin: &PeerId, seq: u64) -> bool {
        self.persisted.contains(&(origin.clone(), seq))
    }

    /// Persist one entry. Returns the frame number, or `None` when the
    /// entry was written before.
    pub fn append(&mut self, entry: &LogEntry) -> StoreResult<Option<u64>> {
        if self.contains(&entry.origin, entry.seq) {
            return Ok(None);
        }
        let frame = Frame::new(self.seq, now_millis(), serde_json::to_vec(entry)?);

        self.file.write_all(&frame.seq.to_le_bytes())?;
        self.file.write_all(&frame.timestamp.to_le_bytes())?;
        self.file.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        self.file.write_all(&frame.data)?;
        self.file.write_all(&frame.checksum.to_le_bytes())?;
        self.file.flush()?;

        self.size += FRAME_OVERHEAD + frame.data.len();
        self.seq += 1;
        self.persisted.insert((entry.origin.clone(), entry.seq));

        Ok(Some(frame.seq))
    }

    /// Read every frame, stopping at a torn tail
    pub fn read_frames(&self) -> StoreResult<Vec<Frame>> {
        let file = File::open(&self.path)?;
        let mut remaining = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut frames = Vec::new();

        loop {
            let mut seq_buf = [0u8; 8];
            match reader.read_exact(&mut seq_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            remaining = remaining.saturating_sub(8);

            match Self::read_rest(&mut reader, u64::from_le_bytes(seq_buf), remaining) {
                Ok(frame) => {
                    remaining = remaining.saturating_sub((FRAME_OVERHEAD - 8 + frame.data.len()) as u64);
                    if !frame.verify_checksum() {
                        return Err(StoreError::CorruptedData(format!(
                            "invalid checksum at frame {} of {}",
                            frame.seq,
                            self.path.display()
                        )));
                    }
                    frames.push(frame);
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!(path = %self.path.display(), frames = frames.len(), "ignoring torn frame at end of commit log");
                    break;
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Err(StoreError::CorruptedData(format!(
                        "frame {} of {}: {}",
                        frames.len(),
                        self.path.display(),
                        e
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(frames)
    }

    /// Read a frame after its seq field. `remaining` is the number of bytes
    /// left in the file; a declared length beyond it is a torn tail.
    fn read_rest<R: Read>(reader: &mut R, seq: u64, remaining: u64) -> std::io::Result<Frame> {
        let mut ts_buf = [0u8; 8];
        reader.read_exact(&mut ts_buf)?;

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("declared length {} exceeds {}", len, MAX_FRAME_LEN),
            ));
        }
        if (len + 4) as u64 > remaining.saturating_sub(12) {
            return Err(ErrorKind::UnexpectedEof.into());
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let mut checksum_buf = [0u8; 4];
        reader.read_exact(&mut checksum_buf)?;

        Ok(Frame {
            seq,
            timestamp: u64::from_le_bytes(ts_buf),
            data,
            checksum: u32::from_le_bytes(checksum_buf),
        })
    }

    /// Decode all persisted entries. Frames that do not decode are skipped.
    pub fn read_entries(&self) -> StoreResult<Vec<LogEntry>> {
        let frames = self.read_frames()?;
        Ok(self.decode(&frames))
    }

    fn decode(&self, frames: &[Frame]) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        for frame in frames {
            match serde_json::from_slice::<LogEntry>(&frame.data) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %self.path.display(), frame = frame.seq, error = %e, "skipping undecodable commit log frame");
                }
            }
        }
        entries
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of frames written
    pub fn current_seq(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::crdt::CausalPosition;
    use crate::core_store::model::{DocumentId, PeerId};
    use crate::core_store::store::append_log::Operation;
    use serde_json::json;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn entry(seq: u64) -> LogEntry {
        LogEntry::new(
            Operation::Put,
            DocumentId(seq),
            json!({"name": format!("donor {}", seq)}).as_object().cloned(),
            CausalPosition::new(seq, PeerId::new("a")),
            seq,
        )
        .unwrap()
    }

    #[test]
    fn test_commit_log_creation() {
        let dir = tempdir().unwrap();
        let log = CommitLog::open(dir.path().join("nested").join("commit.log")).unwrap();
        assert_eq!(log.size(), 0);
        assert_eq!(log.current_seq(), 0);
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut log = CommitLog::open(path.clone()).unwrap();
        assert_eq!(log.append(&entry(1)).unwrap(), Some(0));
        assert_eq!(log.append(&entry(2)).unwrap(), Some(1));
        drop(log);

        let log = CommitLog::open(path).unwrap();
        assert_eq!(log.current_seq(), 2);
        let entries = log.read_entries().unwrap();
        assert_eq!(entries, vec![entry(1), entry(2)]);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut log = CommitLog::open(path.clone()).unwrap();
        log.append(&entry(1)).unwrap();
        drop(log);

        // Flip one byte inside the payload
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8 + 8 + 4 + 2] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        match CommitLog::open(path) {
            Err(StoreError::CorruptedData(_)) => {}
            other => panic!("expected corruption, got {:?}", other.map(|l| l.current_seq())),
        }
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut log = CommitLog::open(path.clone()).unwrap();
        log.append(&entry(1)).unwrap();
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&7u64.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let mut log = CommitLog::open(path).unwrap();
        assert_eq!(log.read_entries().unwrap().len(), 1);

        log.append(&entry(2)).unwrap();
        assert_eq!(log.read_entries().unwrap(), vec![entry(1), entry(2)]);
    }

    #[test]
    fn test_entry_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut log = CommitLog::open(path.clone()).unwrap();
        log.append(&entry(1)).unwrap();
        assert_eq!(log.append(&entry(1)).unwrap(), None);
        drop(log);

        let mut log = CommitLog::open(path).unwrap();
        assert!(log.contains(&PeerId::new("a"), 1));
        assert_eq!(log.append(&entry(1)).unwrap(), None);
        assert_eq!(log.read_entries().unwrap(), vec![entry(1)]);
    }

    #[test]
    fn test_oversized_length_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(CommitLog::open(path), Err(StoreError::CorruptedData(_))));
    }

    #[test]
    fn test_length_past_end_is_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.log");

        let mut log = CommitLog::open(path.clone()).unwrap();
        log.append(&entry(1)).unwrap();
        let valid = log.size();
        drop(log);

        // Header of a 4 KiB frame whose payload never made it to disk
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&1u64.to_le_bytes()).unwrap();
        file.write_all(&0u64.to_le_bytes()).unwrap();
        file.write_all(&4096u32.to_le_bytes()).unwrap();
        file.write_all(&[7u8; 10]).unwrap();
        drop(file);

        let log = CommitLog::open(path).unwrap();
        assert_eq!(log.size(), valid);
        assert_eq!(log.read_entries().unwrap(), vec![entry(1)]);
    }

    #[test]
    fn test_frame_size_accounting() {
        let dir = tempdir().unwrap();
        let mut log = CommitLog::open(dir.path().join("commit.log")).unwrap();
        let e = entry(1);
        let payload = serde_json::to_vec(&e).unwrap().len();
        log.append(&e).unwrap();
        assert_eq!(log.size(), FRAME_OVERHEAD + payload);
    }
}
