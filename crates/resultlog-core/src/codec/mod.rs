//! Record codecs: how one sample is laid out in a log file.
//!
//! A codec only frames and encodes records. Lifecycle, masking and ordering
//! belong to [`ResultStore`](crate::store::ResultStore), so every codec sees
//! the same contract.

use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultLogError};
use crate::mask::ContentMask;
use crate::models::SampleResult;

pub mod csv;
pub mod json;
pub mod yaml;

pub use self::csv::CsvCodec;
pub use self::json::JsonLinesCodec;
pub use self::yaml::YamlCodec;

/// Format-specific encoder/decoder for one record.
pub trait RecordCodec: Send + Sync + fmt::Debug {
    fn format(&self) -> LogFormat;

    /// Appends the complete encoding of `sample` to `out`.
    ///
    /// `sample` has already been reduced by `mask`.
    fn encode(&self, sample: &SampleResult, mask: ContentMask, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes the next record, or returns `None` at a clean end of input.
    /// Input that ends partway through a record is an error.
    fn decode(&self, input: &mut dyn BufRead, mask: ContentMask) -> Result<Option<SampleResult>>;

    /// Header written once at the start of an empty log, describing the
    /// record layout for `mask`. Self-describing formats have none.
    fn layout_header(&self, _mask: ContentMask) -> Option<String> {
        None
    }

    /// Reads the header written by [`layout_header`](Self::layout_header) and
    /// returns the mask whose layout it describes.
    fn read_layout(&self, _input: &mut dyn BufRead) -> Result<Option<ContentMask>> {
        Ok(None)
    }
}

/// Built-in log formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    #[serde(rename = "jsonl", alias = "json")]
    JsonLines,
    /// One YAML document per record, framed by `---` / `...`.
    #[serde(rename = "yaml", alias = "yml")]
    Yaml,
    /// One CSV row per sample, columns chosen by the mask.
    #[serde(rename = "csv")]
    Csv,
}

impl LogFormat {
    pub const ALL: [LogFormat; 3] = [LogFormat::JsonLines, LogFormat::Yaml, LogFormat::Csv];

    pub fn name(self) -> &'static str {
        match self {
            LogFormat::JsonLines => "jsonl",
            LogFormat::Yaml => "yaml",
            LogFormat::Csv => "csv",
        }
    }

    pub fn codec(self) -> Box<dyn RecordCodec> {
        match self {
            LogFormat::JsonLines => Box::new(JsonLinesCodec),
            LogFormat::Yaml => Box::new(YamlCodec),
            LogFormat::Csv => Box::new(CsvCodec),
        }
    }

    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogFormat {
    type Err = ResultLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" | "json" | "ndjson" => Ok(LogFormat::JsonLines),
            "yaml" | "yml" => Ok(LogFormat::Yaml),
            "csv" => Ok(LogFormat::Csv),
            other => Err(ResultLogError::InvalidArgument(format!(
                "unknown log format '{other}' (expected jsonl, yaml or csv)"
            ))),
        }
    }
}

/// Reads one `\n`-terminated line into `buf`, returning `false` at end of
/// input. A final line without a terminator is a truncated record.
pub(crate) fn read_line(
    input: &mut dyn BufRead,
    format: &'static str,
    buf: &mut String,
) -> Result<bool> {
    buf.clear();
    if input.read_line(buf)? == 0 {
        return Ok(false);
    }
    if !buf.ends_with('\n') {
        return Err(ResultLogError::codec(format, "truncated record at end of log"));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_roundtrip() {
        for format in LogFormat::ALL {
            assert_eq!(format.name().parse::<LogFormat>().unwrap(), format);
            assert_eq!(format.codec().format(), format);
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            LogFormat::from_path(Path::new("run/results.jsonl")),
            Some(LogFormat::JsonLines)
        );
        assert_eq!(LogFormat::from_path(Path::new("r.yml")), Some(LogFormat::Yaml));
        assert_eq!(LogFormat::from_path(Path::new("r.csv")), Some(LogFormat::Csv));
        assert_eq!(LogFormat::from_path(Path::new("r.xml")), None);
        assert_eq!(LogFormat::from_path(Path::new("results")), None);
    }

    #[test]
    fn test_format_serde_names() {
        assert_eq!(serde_yaml::to_string(&LogFormat::JsonLines).unwrap().trim(), "jsonl");
        assert_eq!(
            serde_yaml::from_str::<LogFormat>("json").unwrap(),
            LogFormat::JsonLines
        );
    }
}
