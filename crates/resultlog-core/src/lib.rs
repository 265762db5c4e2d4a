//! resultlog-core: persistence for load-test sample results.
//!
//! A [`ResultStore`] records [`SampleResult`] trees to a log file, reduced by
//! a [`ContentMask`], and replays them in write order either all at once or
//! in chunks behind a per-session read cursor. Records are encoded by a
//! pluggable [`RecordCodec`] (JSON lines, YAML documents or CSV rows).
//!
//! Hot-path producers can use [`SampleRecorder`], which queues samples on a
//! channel and appends them in batches from a background tokio task.

pub mod codec;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod export;
pub mod handle;
pub mod mask;
pub mod models;
pub mod report;
pub mod storage;
pub mod store;

pub use codec::{LogFormat, RecordCodec};
pub use config::StoreConfig;
pub use cursor::ReadCursor;
pub use engine::{RecorderStats, SampleRecorder};
pub use error::{Result, ResultLogError};
pub use handle::LogHandle;
pub use mask::ContentMask;
pub use models::{AssertionResult, BaseInfo, ExtraInfo, Mode, SampleResult};
pub use report::{summarize, LabelSummary};
pub use store::ResultStore;
