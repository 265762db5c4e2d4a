//! Non-blocking recorder in front of a [`ResultStore`].
//!
//! `SampleRecorder::start()` opens the store and hands it to a background
//! tokio task on a dedicated runtime. `record()` is a channel send; the task
//! batches samples and appends them every `flush_interval_records` samples or
//! `flush_interval_ms` milliseconds, whichever comes first.
//!
//! A single channel feeds a single task, so samples sent from one thread are
//! written in send order. Write failures are kept and reported by the next
//! `flush()` or `close()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, ResultLogError};
use crate::models::SampleResult;
use crate::store::ResultStore;

/// Commands sent to the background recording task.
enum RecordCommand {
    /// Buffer one sample.
    Sample(SampleResult),
    /// Write the buffer now and report any failure since the last flush.
    Flush(oneshot::Sender<Result<()>>),
    /// Write the buffer, close the store and stop.
    Shutdown(oneshot::Sender<Result<RecorderStats>>),
}

/// Totals reported when a recorder shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Samples appended to the log.
    pub written: u64,
    /// Samples lost to failed appends.
    pub dropped: u64,
}

pub struct SampleRecorder {
    sender: mpsc::UnboundedSender<RecordCommand>,
    /// Keep the runtime alive as long as the recorder exists.
    runtime: Arc<Runtime>,
    config: StoreConfig,
}

impl SampleRecorder {
    /// Opens the configured store and spawns the background writer.
    ///
    /// Open failures (bad mask, busy log, I/O) are returned here rather than
    /// deferred to the first flush.
    pub fn start(config: StoreConfig) -> Result<Self> {
        let mut store = ResultStore::from_config(&config);
        store.open_configured(&config)?;

        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("resultlog-io")
                .enable_all()
                .build()?,
        );

        let (sender, receiver) = mpsc::unbounded_channel::<RecordCommand>();
        runtime.spawn(background_task(
            receiver,
            store,
            config.flush_interval_records.max(1),
            config.flush_interval_ms.max(1),
        ));

        info!(
            path = %config.path.display(),
            format = %config.format,
            mode = %config.mode,
            mask = %config.mask,
            "SampleRecorder started"
        );

        Ok(Self {
            sender,
            runtime,
            config,
        })
    }

    /// Queues a sample. Non-blocking; after shutdown the sample is dropped.
    pub fn record(&self, sample: SampleResult) {
        let _ = self.sender.send(RecordCommand::Sample(sample));
    }

    /// Writes everything queued so far. Returns the first write failure since
    /// the previous flush, if any.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RecordCommand::Flush(tx))
            .map_err(|_| ResultLogError::ChannelClosed)?;
        rx.await.map_err(|_| ResultLogError::ChannelClosed)?
    }

    /// Blocking variant of [`flush`](Self::flush) for synchronous callers.
    pub fn flush_blocking(&self) -> Result<()> {
        self.runtime.block_on(self.flush())
    }

    /// Writes what is queued, closes the store and stops the task. Blocks
    /// until the log is closed. Must not be called from inside an async
    /// context.
    pub fn close(self) -> Result<RecorderStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RecordCommand::Shutdown(tx))
            .map_err(|_| ResultLogError::ChannelClosed)?;
        self.runtime
            .block_on(rx)
            .map_err(|_| ResultLogError::ChannelClosed)?
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Drop for SampleRecorder {
    fn drop(&mut self) {
        // Best-effort shutdown when close() was not called.
        let (tx, rx) = oneshot::channel();
        if self.sender.send(RecordCommand::Shutdown(tx)).is_ok() {
            let outcome = self
                .runtime
                .block_on(async { tokio::time::timeout(Duration::from_secs(5), rx).await });
            if let Ok(Ok(Err(e))) = outcome {
                warn!("Recorder shutdown on drop failed: {}", e);
            }
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn background_task(
    mut receiver: mpsc::UnboundedReceiver<RecordCommand>,
    mut store: ResultStore,
    flush_interval_records: usize,
    flush_interval_ms: u64,
) {
    let mut buffer: Vec<SampleResult> = Vec::with_capacity(flush_interval_records * 2);
    let mut pending_error: Option<ResultLogError> = None;
    let mut stats = RecorderStats::default();
    let mut flush_ticker = interval(Duration::from_millis(flush_interval_ms));
    flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Prioritize incoming commands
            biased;

            cmd = receiver.recv() => {
                match cmd {
                    None => {
                        // Recorder dropped without shutdown: flush and close.
                        write_buffer(&store, &mut buffer, &mut stats, &mut pending_error);
                        if let Err(e) = store.close_source() {
                            error!("Failed to close log: {}", e);
                        }
                        break;
                    }
                    Some(RecordCommand::Sample(sample)) => {
                        buffer.push(sample);
                        if buffer.len() >= flush_interval_records {
                            write_buffer(&store, &mut buffer, &mut stats, &mut pending_error);
                        }
                    }
                    Some(RecordCommand::Flush(reply)) => {
                        write_buffer(&store, &mut buffer, &mut stats, &mut pending_error);
                        let _ = reply.send(pending_error.take().map_or(Ok(()), Err));
                    }
                    Some(RecordCommand::Shutdown(reply)) => {
                        write_buffer(&store, &mut buffer, &mut stats, &mut pending_error);
                        let closed = store.close_source();
                        let outcome = match (pending_error.take(), closed) {
                            (Some(e), _) | (None, Err(e)) => Err(e),
                            (None, Ok(())) => Ok(stats),
                        };
                        info!(
                            written = stats.written,
                            dropped = stats.dropped,
                            "SampleRecorder stopped"
                        );
                        let _ = reply.send(outcome);
                        break;
                    }
                }
            }

            // Periodic flush
            _ = flush_ticker.tick() => {
                if !buffer.is_empty() {
                    write_buffer(&store, &mut buffer, &mut stats, &mut pending_error);
                }
            }
        }
    }
}

fn write_buffer(
    store: &ResultStore,
    buffer: &mut Vec<SampleResult>,
    stats: &mut RecorderStats,
    pending_error: &mut Option<ResultLogError>,
) {
    if buffer.is_empty() {
        return;
    }
    let count = buffer.len() as u64;
    match store.record_samples(buffer) {
        Ok(()) => stats.written += count,
        Err(e) => {
            error!(samples = count, "Failed to write samples: {}", e);
            stats.dropped += count;
            pending_error.get_or_insert(e);
        }
    }
    buffer.clear();
}
