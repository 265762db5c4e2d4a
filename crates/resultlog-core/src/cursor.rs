//! Incremental read position and the bounded reader used to decode records.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Take};
use std::path::Path;

use crate::error::Result;

/// Position of the next unread record for `load_log_chunk`.
///
/// Tracks both the byte offset, so a chunked read can seek straight to it,
/// and the number of records consumed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCursor {
    offset: u64,
    records: u64,
}

impl ReadCursor {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub(crate) fn advance(&mut self, bytes: u64, records: u64) {
        self.offset += bytes;
        self.records += records;
    }
}

/// Reader over `[start, end)` of a log file.
///
/// `end` is the committed length at the time the reader was created, so a
/// record that another thread is still appending is never observed.
pub(crate) struct RecordReader {
    inner: BufReader<Take<File>>,
    window: u64,
}

impl RecordReader {
    pub(crate) fn open(path: &Path, start: u64, end: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        let window = end.saturating_sub(start);
        Ok(Self {
            inner: BufReader::new(file.take(window)),
            window,
        })
    }

    pub(crate) fn input(&mut self) -> &mut dyn BufRead {
        &mut self.inner
    }

    /// Bytes handed out to the decoder so far.
    pub(crate) fn consumed(&self) -> u64 {
        let pulled = self.window - self.inner.get_ref().limit();
        pulled - self.inner.buffer().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reader_is_bounded_and_counts_consumed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"one\ntwo\nthree\n")
            .unwrap();

        let mut reader = RecordReader::open(&path, 4, 12).unwrap();
        let mut line = String::new();
        reader.input().read_line(&mut line).unwrap();
        assert_eq!(line, "two\n");
        assert_eq!(reader.consumed(), 4);

        line.clear();
        reader.input().read_line(&mut line).unwrap();
        assert_eq!(line, "thre");
        assert_eq!(reader.consumed(), 8);
    }

    #[test]
    fn test_cursor_advance() {
        let mut cursor = ReadCursor::default();
        cursor.advance(10, 2);
        cursor.advance(5, 1);
        assert_eq!(cursor.offset(), 15);
        assert_eq!(cursor.records(), 3);
    }
}
