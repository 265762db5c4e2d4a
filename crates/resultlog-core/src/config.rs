//! Store configuration, loadable from YAML.
//!
//! ```yaml
//! path: results/run-01.jsonl
//! format: jsonl
//! mode: append
//! mask: [base_info, extra_info, sub_results]
//! flush_interval_records: 50
//! flush_interval_ms: 500
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::LogFormat;
use crate::error::Result;
use crate::mask::ContentMask;
use crate::models::Mode;
use crate::storage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Log file to record to and replay from
    pub path: PathBuf,
    pub format: LogFormat,
    pub mode: Mode,
    pub mask: ContentMask,
    /// Recorder: write buffered samples every N records (default: 50)
    pub flush_interval_records: usize,
    /// Recorder: write buffered samples every N milliseconds (default: 500)
    pub flush_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("results.jsonl"),
            format: LogFormat::JsonLines,
            mode: Mode::Append,
            mask: ContentMask::BASE_INFO
                | ContentMask::EXTRA_INFO
                | ContentMask::SUB_RESULTS
                | ContentMask::ASSERTION_RESULTS,
            flush_interval_records: 50,
            flush_interval_ms: 500,
        }
    }
}

impl StoreConfig {
    /// Config for `path`, with the format guessed from its extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = LogFormat::from_path(&path).unwrap_or_default();
        Self {
            path,
            format,
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mask(mut self, mask: ContentMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_flush_interval(mut self, records: usize, ms: u64) -> Self {
        self.flush_interval_records = records;
        self.flush_interval_ms = ms;
        self
    }

    /// Loads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        storage::load_yaml(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::save_yaml(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_guesses_format() {
        assert_eq!(StoreConfig::new("a/b.csv").format, LogFormat::Csv);
        assert_eq!(StoreConfig::new("a/b.yaml").format, LogFormat::Yaml);
        assert_eq!(StoreConfig::new("a/b.log").format, LogFormat::JsonLines);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: StoreConfig =
            serde_yaml::from_str("path: out.csv\nformat: csv\nmask: 0x11\n").unwrap();
        assert_eq!(config.format, LogFormat::Csv);
        assert_eq!(config.mode, Mode::Append);
        assert_eq!(
            config.mask,
            ContentMask::BASE_INFO | ContentMask::REQUEST_DATA
        );
        assert_eq!(config.flush_interval_records, 50);
    }

    #[test]
    fn test_invalid_mask_rejected() {
        assert!(serde_yaml::from_str::<StoreConfig>("mask: 128\n").is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("store.yaml");
        let config = StoreConfig::new(tmp.path().join("r.yaml"))
            .with_mode(Mode::Overwrite)
            .with_mask(ContentMask::ALL)
            .with_flush_interval(10, 100);
        config.save(&file).unwrap();
        assert_eq!(StoreConfig::load(&file).unwrap(), config);
    }
}
