//! Durable queue backed by a single journal file
//!
//! Every mutation is written to the journal as a CRC-protected frame before it
//! is applied to the in-memory image, so the image can always be rebuilt by
//! replaying the file. On open, replay stops at the first torn or corrupt
//! frame and the file is truncated there.
//!
//! Evicted records stay in the journal until they dominate it; the journal is
//! then rewritten with only the live records.

use eventstore_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::journal::{
    append_chunks, append_frame, check_header, header_bytes, FrameError, JournalOp,
    JOURNAL_HEADER_SIZE, MAX_FRAME_LEN,
};
use crate::queue::{PersistentQueue, RecordIter, SequenceIter, SequencedRecords};

/// Journal file name inside the queue directory
pub const JOURNAL_FILE_NAME: &str = "queue.journal";

/// Tuning for [`FileQueue`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileQueueConfig {
    /// fsync after every journaled mutation
    pub sync_writes: bool,
    /// Minimum evicted records before the journal is rewritten
    pub compact_min_dead: usize,
}

impl Default for FileQueueConfig {
    fn default() -> Self {
        Self {
            sync_writes: false,
            compact_min_dead: 10_000,
        }
    }
}

struct JournalFile {
    file: File,
    /// Length of the journal up to the last complete frame
    len: u64,
    dead_records: usize,
    #[cfg(test)]
    fail_after_bytes: Option<usize>,
}

impl JournalFile {
    fn new(file: File, dead_records: usize) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            dead_records,
            #[cfg(test)]
            fail_after_bytes: None,
        })
    }

    #[cfg(not(test))]
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.file.write_all(frame)
    }

    #[cfg(test)]
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        match self.fail_after_bytes.take() {
            Some(limit) => {
                self.file.write_all(&frame[..limit.min(frame.len())])?;
                Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"))
            }
            None => self.file.write_all(frame),
        }
    }

    /// Cut the file back to the last complete frame after a failed write
    fn roll_back(&mut self, path: &Path) {
        let len = self.len;
        let result = self.file.set_len(len).or_else(|_| {
            self.file = OpenOptions::new().append(true).open(path)?;
            self.file.set_len(len)
        });
        if let Err(e) = result {
            error!(
                target: "eventstore::queue",
                path = %path.display(),
                len,
                error = %e,
                "Failed to remove partial journal frame"
            );
        }
    }
}

fn frame_error(e: FrameError) -> Error {
    Error::queue(format!("cannot journal operation: {}", e))
}

/// Journal-backed persistent queue
pub struct FileQueue {
    path: PathBuf,
    config: FileQueueConfig,
    records: Arc<RwLock<SequencedRecords>>,
    journal: Mutex<JournalFile>,
}

impl FileQueue {
    /// Open (or create) the queue stored in `dir`
    pub fn open(dir: impl AsRef<Path>, config: FileQueueConfig) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE_NAME);

        let (records, dead_records) = if path.exists() {
            replay(&path)?
        } else {
            std::fs::write(&path, header_bytes())?;
            (SequencedRecords::default(), 0)
        };

        info!(
            target: "eventstore::queue",
            path = %path.display(),
            records = records.len(),
            dead_records,
            "Opened queue journal"
        );

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            path,
            config,
            records: Arc::new(RwLock::new(records)),
            journal: Mutex::new(JournalFile::new(file, dead_records)?),
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the journal so it only holds live records
    pub fn compact(&self) -> Result<()> {
        let mut journal = self.journal.lock();
        self.rewrite(&mut journal)
    }

    fn write_op(&self, journal: &mut JournalFile, op: &JournalOp) -> Result<()> {
        self.write_frames(journal, std::iter::once(op.to_frame()))
    }

    /// Write whole frames or nothing: on failure the journal is cut back to
    /// where it stood before the call.
    fn write_frames<I>(&self, journal: &mut JournalFile, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = std::result::Result<Vec<u8>, FrameError>>,
    {
        let mut written = 0u64;
        let mut result: Result<()> = Ok(());
        for frame in frames {
            result = frame.map_err(frame_error).and_then(|frame| {
                journal.write_frame(&frame)?;
                written += frame.len() as u64;
                Ok(())
            });
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() && self.config.sync_writes {
            result = journal.file.sync_data().map_err(Error::from);
        }
        match result {
            Ok(()) => {
                journal.len += written;
                Ok(())
            }
            Err(e) => {
                journal.roll_back(&self.path);
                Err(e)
            }
        }
    }

    fn maybe_compact(&self, journal: &mut JournalFile) {
        let live = self.records.read().len();
        if journal.dead_records < self.config.compact_min_dead || journal.dead_records < live {
            return;
        }
        if let Err(e) = self.rewrite(journal) {
            warn!(target: "eventstore::queue", error = %e, "Journal compaction failed");
        }
    }

    fn rewrite(&self, journal: &mut JournalFile) -> Result<()> {
        let tmp = self.path.with_extension("journal.tmp");
        let live = {
            let snapshot = self.records.read();
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(&header_bytes())?;
            if let Some(version) = snapshot.format_version() {
                let frame = JournalOp::SetVersion(version).to_frame().map_err(frame_error)?;
                out.write_all(&frame)?;
            }
            let live: Vec<String> = snapshot.iter_tail_to_head().cloned().collect();
            for chunk in append_chunks(&live, MAX_FRAME_LEN).map_err(frame_error)? {
                out.write_all(&append_frame(chunk).map_err(frame_error)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
            live.len()
        };
        std::fs::rename(&tmp, &self.path)?;
        journal.file = OpenOptions::new().append(true).open(&self.path)?;
        journal.len = journal.file.metadata()?.len();
        let reclaimed = std::mem::take(&mut journal.dead_records);
        debug!(
            target: "eventstore::queue",
            live_records = live,
            reclaimed,
            "Journal compacted"
        );
        Ok(())
    }
}

/// Rebuild the in-memory image from the journal, truncating any torn tail.
fn replay(path: &Path) -> Result<(SequencedRecords, usize)> {
    let bytes = std::fs::read(path)?;
    let mut records = SequencedRecords::default();
    let mut dead_records = 0usize;

    if bytes.len() < JOURNAL_HEADER_SIZE {
        warn!(
            target: "eventstore::queue",
            path = %path.display(),
            "Journal header incomplete; starting empty"
        );
        std::fs::write(path, header_bytes())?;
        return Ok((records, 0));
    }
    check_header(&bytes)
        .map_err(|e| Error::corruption(format!("{}: {}", path.display(), e)))?;

    let mut offset = JOURNAL_HEADER_SIZE;
    while offset < bytes.len() {
        match JournalOp::from_frame(&bytes[offset..]) {
            Ok((op, used)) => {
                match op {
                    JournalOp::Append(batch) => records.push_owned(batch),
                    JournalOp::RemoveTail(count) => {
                        dead_records += records.remove_tail(count as usize);
                    }
                    JournalOp::Clear => {
                        dead_records += records.len();
                        records.clear();
                    }
                    JournalOp::SetVersion(version) => records.set_format_version(&version),
                }
                offset += used;
            }
            Err(e) => {
                warn!(
                    target: "eventstore::queue",
                    offset,
                    discarded_bytes = bytes.len() - offset,
                    error = %e,
                    "Discarding journal tail after unreadable frame"
                );
                break;
            }
        }
    }

    if offset < bytes.len() {
        OpenOptions::new()
            .write(true)
            .open(path)?
            .set_len(offset as u64)?;
    }
    Ok((records, dead_records))
}

impl PersistentQueue for FileQueue {
    fn append_all(&self, records: &[String]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let chunks = append_chunks(records, MAX_FRAME_LEN).map_err(frame_error)?;
        let mut journal = self.journal.lock();
        self.write_frames(&mut journal, chunks.into_iter().map(append_frame))?;
        self.records.write().push_all(records);
        Ok(())
    }

    fn remove_from_tail(&self, count: usize) -> Result<usize> {
        let mut journal = self.journal.lock();
        let count = count.min(self.records.read().len());
        if count == 0 {
            return Ok(0);
        }
        self.write_op(&mut journal, &JournalOp::RemoveTail(count as u64))?;
        let removed = self.records.write().remove_tail(count);
        journal.dead_records += removed;
        self.maybe_compact(&mut journal);
        Ok(removed)
    }

    fn peek_tail(&self) -> Result<Option<String>> {
        Ok(self.records.read().peek_tail())
    }

    fn size(&self) -> usize {
        self.records.read().len()
    }

    fn iter_head_to_tail(&self) -> RecordIter {
        Box::new(SequenceIter::new(Arc::clone(&self.records)))
    }

    fn clear(&self) -> Result<()> {
        let mut journal = self.journal.lock();
        self.write_op(&mut journal, &JournalOp::Clear)?;
        let mut records = self.records.write();
        journal.dead_records += records.len();
        records.clear();
        drop(records);
        self.maybe_compact(&mut journal);
        Ok(())
    }

    fn format_version(&self) -> Result<Option<String>> {
        Ok(self.records.read().format_version())
    }

    fn set_format_version(&self, version: &str) -> Result<()> {
        let mut journal = self.journal.lock();
        self.write_op(&mut journal, &JournalOp::SetVersion(version.to_string()))?;
        self.records.write().set_format_version(version);
        Ok(())
    }
}
