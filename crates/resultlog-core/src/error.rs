//! Error types for resultlog-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::mask::ContentMask;

#[derive(Error, Debug)]
pub enum ResultLogError {
    #[error("Log is already open: {0}")]
    AlreadyOpen(PathBuf),

    #[error("Log is not open")]
    NotOpen,

    #[error("Invalid content mask {0}: only bits 0-5 (values 0..=63) may be set")]
    InvalidMask(i128),

    #[error("Log columns were recorded for mask {recorded}; cannot open with mask {requested}")]
    LayoutMismatch {
        recorded: ContentMask,
        requested: ContentMask,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Log is held open by another handle: {0}")]
    ResourceBusy(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {format} record: {message}")]
    Codec {
        format: &'static str,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Recorder channel closed")]
    ChannelClosed,
}

impl ResultLogError {
    pub(crate) fn codec(format: &'static str, message: impl Into<String>) -> Self {
        ResultLogError::Codec {
            format,
            message: message.into(),
        }
    }
}

impl From<std::convert::Infallible> for ResultLogError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

pub type Result<T> = std::result::Result<T, ResultLogError>;
