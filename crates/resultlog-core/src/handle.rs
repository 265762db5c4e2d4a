//! Lifecycle owner for one log file: Closed ⇄ Open.
//!
//! While open, the handle exclusively owns the file (guarded by a `.lck`
//! sidecar), the write slot and the read cursor. Writes are serialized by a
//! mutex and are all-or-nothing: a failed append truncates the file back to
//! its last committed length.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cursor::{ReadCursor, RecordReader};
use crate::error::{Result, ResultLogError};
use crate::mask::ContentMask;
use crate::models::Mode;
use crate::storage::{self, LockGuard};

/// Storage behind a [`LogWriter`].
trait LogFile: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Append-only writer tracking how many bytes are durable records.
#[derive(Debug)]
struct LogWriter<F: LogFile = File> {
    file: F,
    committed: u64,
}

impl<F: LogFile> LogWriter<F> {
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.file.write_all(bytes) {
            if let Err(rollback) = self.file.truncate(self.committed) {
                warn!(
                    committed = self.committed,
                    "Failed to roll back partial append: {}", rollback
                );
            }
            return Err(e.into());
        }
        self.committed += bytes.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync()?;
        Ok(())
    }
}

/// State held only while the handle is open.
#[derive(Debug)]
struct OpenSession {
    id: Uuid,
    mode: Mode,
    mask: ContentMask,
    writer: Mutex<LogWriter>,
    cursor: Mutex<ReadCursor>,
    // Declared last so the file is closed before the lock is released.
    _lock: LockGuard,
}

impl OpenSession {
    fn writer(&self) -> MutexGuard<'_, LogWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cursor(&self) -> MutexGuard<'_, ReadCursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct LogHandle {
    path: PathBuf,
    session: Option<OpenSession>,
}

impl LogHandle {
    /// A closed handle for the log at `path`. Nothing is touched on disk
    /// until [`open`](Self::open).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.mode)
    }

    pub fn mask(&self) -> Option<ContentMask> {
        self.session.as_ref().map(|s| s.mask)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Closed → Open.
    ///
    /// `Overwrite` truncates the file; `Append` keeps it and writes after the
    /// existing records. Either way the read cursor starts at the first
    /// record. On failure the handle stays closed.
    pub fn open(&mut self, mode: Mode, mask: ContentMask) -> Result<()> {
        if self.session.is_some() {
            return Err(ResultLogError::AlreadyOpen(self.path.clone()));
        }

        storage::ensure_parent(&self.path)?;
        let lock = LockGuard::acquire(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if mode == Mode::Overwrite {
            file.set_len(0)?;
        }
        let committed = file.metadata()?.len();

        let id = Uuid::new_v4();
        info!(
            path = %self.path.display(),
            %mode,
            %mask,
            session = %id,
            existing_bytes = committed,
            "Log opened"
        );

        self.session = Some(OpenSession {
            id,
            mode,
            mask,
            writer: Mutex::new(LogWriter { file, committed }),
            cursor: Mutex::new(ReadCursor::default()),
            _lock: lock,
        });
        Ok(())
    }

    /// Open → Closed.
    ///
    /// The file and lock are released even when the final sync fails; the
    /// sync error is still returned.
    pub fn close(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(ResultLogError::NotOpen)?;
        let id = session.id;
        let mut writer = session
            .writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let synced = writer.sync();
        let committed = writer.committed;
        drop(writer);
        drop(session._lock);

        match &synced {
            Ok(()) => info!(
                path = %self.path.display(),
                session = %id,
                bytes = committed,
                "Log closed"
            ),
            Err(e) => warn!(
                path = %self.path.display(),
                session = %id,
                "Log closed with sync failure: {}", e
            ),
        }
        synced
    }

    fn session(&self) -> Result<&OpenSession> {
        self.session.as_ref().ok_or(ResultLogError::NotOpen)
    }

    /// Appends one or more fully encoded records as a single unit.
    pub(crate) fn append(&self, bytes: &[u8]) -> Result<()> {
        self.session()?.writer().append(bytes)
    }

    /// Length of the log covered by completed appends.
    pub(crate) fn committed_len(&self) -> Result<u64> {
        Ok(self.session()?.writer().committed)
    }

    /// Reader over the committed bytes from `start`, independent of the
    /// cursor.
    pub(crate) fn read_from(&self, start: u64) -> Result<RecordReader> {
        let end = self.committed_len()?;
        RecordReader::open(&self.path, start, end)
    }

    /// Runs `read` on a reader positioned at the cursor. `read` reports how
    /// many records it decoded; the cursor moves only if it succeeds.
    pub(crate) fn read_from_cursor<T>(
        &self,
        read: impl FnOnce(&mut RecordReader) -> Result<(T, u64)>,
    ) -> Result<T> {
        let session = self.session()?;
        let mut cursor = session.cursor();
        let end = session.writer().committed;
        let mut reader = RecordReader::open(&self.path, cursor.offset(), end)?;
        let (out, records) = read(&mut reader)?;
        cursor.advance(reader.consumed(), records);
        debug!(
            session = %session.id,
            records,
            position = cursor.records(),
            "Cursor advanced"
        );
        Ok(out)
    }

    /// Records consumed by incremental reads in this session.
    pub fn position(&self) -> Result<u64> {
        Ok(self.session()?.cursor().records())
    }

    pub fn cursor(&self) -> Result<ReadCursor> {
        Ok(*self.session()?.cursor())
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), "Best-effort close on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::lock_path;
    use tempfile::TempDir;

    #[test]
    fn test_lifecycle_transitions() {
        let tmp = TempDir::new().unwrap();
        let mut handle = LogHandle::new(tmp.path().join("a.log"));
        assert!(!handle.is_open());
        assert!(matches!(handle.close(), Err(ResultLogError::NotOpen)));

        handle.open(Mode::Overwrite, ContentMask::ALL).unwrap();
        assert!(handle.is_open());
        assert_eq!(handle.mode(), Some(Mode::Overwrite));
        assert_eq!(handle.mask(), Some(ContentMask::ALL));

        let id = handle.session_id();
        assert!(matches!(
            handle.open(Mode::Append, ContentMask::BASE_INFO),
            Err(ResultLogError::AlreadyOpen(_))
        ));
        assert_eq!(handle.session_id(), id);
        assert_eq!(handle.mode(), Some(Mode::Overwrite));

        handle.close().unwrap();
        assert!(!handle.is_open());
        assert!(matches!(handle.close(), Err(ResultLogError::NotOpen)));
    }

    #[test]
    fn test_overwrite_truncates_and_append_keeps() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("b.log");
        std::fs::write(&path, b"old\n").unwrap();

        let mut handle = LogHandle::new(&path);
        handle.open(Mode::Append, ContentMask::ALL).unwrap();
        assert_eq!(handle.committed_len().unwrap(), 4);
        handle.append(b"new\n").unwrap();
        handle.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"old\nnew\n");

        handle.open(Mode::Overwrite, ContentMask::ALL).unwrap();
        assert_eq!(handle.committed_len().unwrap(), 0);
        handle.close().unwrap();
        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_second_handle_is_refused() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.log");
        let mut first = LogHandle::new(&path);
        let mut second = LogHandle::new(&path);

        first.open(Mode::Overwrite, ContentMask::ALL).unwrap();
        first.append(b"keep\n").unwrap();
        assert!(matches!(
            second.open(Mode::Overwrite, ContentMask::ALL),
            Err(ResultLogError::ResourceBusy(_))
        ));
        assert!(!second.is_open());
        // The refused Overwrite must not have truncated the first handle's data.
        assert_eq!(std::fs::read(&path).unwrap(), b"keep\n");

        first.close().unwrap();
        second.open(Mode::Append, ContentMask::ALL).unwrap();
        second.close().unwrap();
    }

    #[test]
    fn test_drop_releases_lock() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d.log");
        {
            let mut handle = LogHandle::new(&path);
            handle.open(Mode::Overwrite, ContentMask::ALL).unwrap();
            assert!(lock_path(&path).exists());
        }
        let mut next = LogHandle::new(&path);
        next.open(Mode::Append, ContentMask::ALL).unwrap();
        assert!(next.is_open());
    }

    #[test]
    fn test_data_operations_require_open() {
        let tmp = TempDir::new().unwrap();
        let handle = LogHandle::new(tmp.path().join("e.log"));
        assert!(matches!(handle.append(b"x"), Err(ResultLogError::NotOpen)));
        assert!(matches!(handle.position(), Err(ResultLogError::NotOpen)));
        assert!(matches!(handle.read_from(0), Err(ResultLogError::NotOpen)));
        assert!(matches!(handle.cursor(), Err(ResultLogError::NotOpen)));
    }

    /// In-memory log that accepts `budget` more bytes, then fails.
    struct ShortDevice {
        data: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "device full"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for ShortDevice {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_rolls_back_partial_record() {
        let mut writer = LogWriter {
            file: ShortDevice {
                data: Vec::new(),
                budget: 64,
            },
            committed: 0,
        };
        writer.append(b"first\n").unwrap();

        writer.file.budget = 3;
        assert!(matches!(
            writer.append(b"second record\n"),
            Err(ResultLogError::Io(_))
        ));
        assert_eq!(writer.file.data, b"first\n");
        assert_eq!(writer.committed, 6);

        writer.file.budget = 64;
        writer.append(b"third\n").unwrap();
        assert_eq!(writer.file.data, b"first\nthird\n");
        assert_eq!(writer.committed, 12);
    }

    #[test]
    fn test_failed_read_still_closes_and_unlocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.log");
        let mut handle = LogHandle::new(&path);
        handle.open(Mode::Overwrite, ContentMask::ALL).unwrap();
        handle.append(b"x\n").unwrap();

        let failed: Result<()> = handle.read_from_cursor(|_| {
            Err(ResultLogError::codec("jsonl", "bad record"))
        });
        assert!(failed.is_err());
        assert_eq!(handle.position().unwrap(), 0);

        handle.close().unwrap();
        let mut next = LogHandle::new(&path);
        next.open(Mode::Append, ContentMask::ALL).unwrap();
        assert_eq!(next.committed_len().unwrap(), 2);
    }
}
