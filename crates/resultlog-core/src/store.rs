//! `ResultStore`: the persistence contract for sample results.
//!
//! ```text
//! open_source(mode, mask) ─► record_sample* / load_log / load_log_chunk* ─► close_source
//! ```
//!
//! `open_source`/`close_source` take `&mut self`, data operations take
//! `&self`, so producers can share one open store across threads (e.g. with
//! `std::thread::scope`) while the borrow checker keeps state transitions
//! out of their way.
//!
//! Formats whose records are not self-describing (CSV) start the log with a
//! header naming the recorded layout. Every later session encodes and decodes
//! with that layout; its own mask must be a subset of it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec::{LogFormat, RecordCodec};
use crate::config::StoreConfig;
use crate::cursor::{ReadCursor, RecordReader};
use crate::error::{Result, ResultLogError};
use crate::handle::LogHandle;
use crate::mask::ContentMask;
use crate::models::{Mode, SampleResult};

/// Record layout of the open log.
#[derive(Debug, Clone, Copy)]
struct Layout {
    /// Mask the records are encoded with.
    mask: ContentMask,
    /// Offset of the first record, past any header.
    data_start: u64,
}

#[derive(Debug)]
pub struct ResultStore {
    handle: LogHandle,
    codec: Box<dyn RecordCodec>,
    layout: Option<Layout>,
}

impl ResultStore {
    /// A closed store for `path` using `codec`.
    pub fn new(path: impl Into<PathBuf>, codec: Box<dyn RecordCodec>) -> Self {
        Self {
            handle: LogHandle::new(path),
            codec,
            layout: None,
        }
    }

    pub fn with_format(path: impl Into<PathBuf>, format: LogFormat) -> Self {
        Self::new(path, format.codec())
    }

    /// A closed store for the configured path and format. Open it with
    /// [`open_configured`](Self::open_configured) or `open_source`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_format(&config.path, config.format)
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn format(&self) -> LogFormat {
        self.codec.format()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.handle.mode()
    }

    pub fn mask(&self) -> Option<ContentMask> {
        self.handle.mask()
    }

    /// Mask named by the log's layout header, read without opening the log.
    ///
    /// `None` for self-describing formats and for a missing or empty log.
    pub fn recorded_mask(&self) -> Result<Option<ContentMask>> {
        if self.codec.layout_header(ContentMask::ALL).is_none() {
            return Ok(None);
        }
        let file = match File::open(self.path()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        self.codec.read_layout(&mut BufReader::new(file))
    }

    /// Swaps the codec. Only allowed while closed.
    pub fn set_codec(&mut self, codec: Box<dyn RecordCodec>) -> Result<()> {
        if self.handle.is_open() {
            return Err(ResultLogError::AlreadyOpen(self.path().to_path_buf()));
        }
        self.codec = codec;
        Ok(())
    }

    /// Opens the log for recording and replay.
    ///
    /// `mask` may be a [`ContentMask`] or a raw integer; integers outside
    /// `0..=63` fail with [`ResultLogError::InvalidMask`]. An already open
    /// store fails with [`ResultLogError::AlreadyOpen`] and its session is
    /// left untouched. Appending to a log whose header records a layout that
    /// lacks some of `mask`'s groups fails with
    /// [`ResultLogError::LayoutMismatch`] before anything is written. On any
    /// failure the store stays closed.
    pub fn open_source<M>(&mut self, mode: Mode, mask: M) -> Result<()>
    where
        M: TryInto<ContentMask>,
        ResultLogError: From<M::Error>,
    {
        if self.handle.is_open() {
            return Err(ResultLogError::AlreadyOpen(self.path().to_path_buf()));
        }
        let mask = mask.try_into()?;
        self.handle.open(mode, mask)?;
        match self.prepare_layout(mask) {
            Ok(layout) => self.layout = Some(layout),
            Err(e) => {
                if let Err(close) = self.handle.close() {
                    warn!(path = %self.path().display(), "Close after failed open: {}", close);
                }
                return Err(e);
            }
        }
        info!(format = %self.codec.format(), "Result store ready");
        Ok(())
    }

    /// Opens with the mode and mask from `config`.
    pub fn open_configured(&mut self, config: &StoreConfig) -> Result<()> {
        self.open_source(config.mode, config.mask)
    }

    /// Flushes to durable storage and releases the log.
    pub fn close_source(&mut self) -> Result<()> {
        self.layout = None;
        self.handle.close()
    }

    /// Reduces `sample` by the active mask and appends it as the next record.
    pub fn record_sample(&self, sample: &SampleResult) -> Result<()> {
        self.record_samples(std::slice::from_ref(sample))
    }

    /// Appends `samples` in order as one all-or-nothing write.
    pub fn record_samples(&self, samples: &[SampleResult]) -> Result<()> {
        let (mask, layout) = self.session()?;
        if samples.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(samples.len() * 128);
        for sample in samples {
            self.codec.encode(&mask.apply(sample), layout.mask, &mut buf)?;
        }
        self.handle.append(&buf)
    }

    /// Every record from the start of the log, in write order. The read
    /// cursor is not moved.
    pub fn load_log(&self) -> Result<Vec<SampleResult>> {
        let (mask, layout) = self.session()?;
        let mut reader = self.handle.read_from(layout.data_start)?;
        let (samples, _) = self.decode_up_to(&mut reader, mask, layout, usize::MAX)?;
        debug!(records = samples.len(), "Loaded full log");
        Ok(samples)
    }

    /// Up to `length` records starting at the read cursor; the cursor moves
    /// past the records returned. An exhausted log yields an empty vector.
    pub fn load_log_chunk(&self, length: usize) -> Result<Vec<SampleResult>> {
        let (mask, layout) = self.session()?;
        if length == 0 {
            return Err(ResultLogError::InvalidArgument(
                "chunk length must be greater than zero".to_string(),
            ));
        }
        self.handle
            .read_from_cursor(|reader| self.decode_up_to(reader, mask, layout, length))
    }

    /// Records consumed by [`load_log_chunk`](Self::load_log_chunk) in this
    /// session.
    pub fn position(&self) -> Result<u64> {
        self.handle.position()
    }

    /// The incremental read cursor, including its byte offset in the log.
    pub fn cursor(&self) -> Result<ReadCursor> {
        self.handle.cursor()
    }

    /// Bytes of the log covered by completed appends.
    pub fn committed_len(&self) -> Result<u64> {
        self.handle.committed_len()
    }

    fn session(&self) -> Result<(ContentMask, Layout)> {
        match (self.handle.mask(), self.layout) {
            (Some(mask), Some(layout)) => Ok((mask, layout)),
            _ => Err(ResultLogError::NotOpen),
        }
    }

    /// Writes the layout header to an empty log, or reads it back from an
    /// existing one, and leaves the cursor on the first record.
    fn prepare_layout(&self, mask: ContentMask) -> Result<Layout> {
        let Some(header) = self.codec.layout_header(mask) else {
            return Ok(Layout {
                mask,
                data_start: 0,
            });
        };
        if self.handle.committed_len()? == 0 {
            self.handle.append(header.as_bytes())?;
        }
        let (recorded, data_start) = self.handle.read_from_cursor(|reader| {
            let recorded = self.codec.read_layout(reader.input())?.unwrap_or(mask);
            Ok(((recorded, reader.consumed()), 0))
        })?;
        if !recorded.contains(mask) {
            return Err(ResultLogError::LayoutMismatch {
                recorded,
                requested: mask,
            });
        }
        debug!(layout = %recorded, data_start, "Layout header read");
        Ok(Layout {
            mask: recorded,
            data_start,
        })
    }

    fn decode_up_to(
        &self,
        reader: &mut RecordReader,
        mask: ContentMask,
        layout: Layout,
        limit: usize,
    ) -> Result<(Vec<SampleResult>, u64)> {
        let mut samples = Vec::new();
        while samples.len() < limit {
            match self.codec.decode(reader.input(), layout.mask)? {
                // Records may carry groups the active mask excludes.
                Some(sample) if mask == ContentMask::ALL => samples.push(sample),
                Some(sample) => samples.push(mask.apply(&sample)),
                None => break,
            }
        }
        let count = samples.len() as u64;
        Ok((samples, count))
    }
}
