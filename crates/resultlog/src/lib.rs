//! resultlog: record load-test sample results to a log and replay them.
//!
//! This crate re-exports [`resultlog_core`]; see [`ResultStore`] for the
//! open/record/replay/close contract and [`SampleRecorder`] for batched,
//! non-blocking recording.

pub use resultlog_core::*;
