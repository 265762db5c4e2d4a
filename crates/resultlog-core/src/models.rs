//! Data models for resultlog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResultLogError;

/// Label, timing and outcome of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseInfo {
    pub label: String,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: u64,
    pub success: bool,
}

/// Miscellaneous details recorded alongside the base info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub thread_name: String,
    pub timestamp: DateTime<Utc>,
    pub response_code: String,
    pub response_message: String,
    /// e.g. "text" or "bin"
    pub data_type: String,
}

impl ExtraInfo {
    /// Extra info stamped with the calling thread's name and the current time.
    pub fn current(response_code: impl Into<String>, response_message: impl Into<String>) -> Self {
        let thread = std::thread::current();
        Self {
            thread_name: thread.name().unwrap_or("unnamed").to_string(),
            timestamp: Utc::now(),
            response_code: response_code.into(),
            response_message: response_message.into(),
            data_type: "text".to_string(),
        }
    }
}

/// Outcome of one assertion applied to a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AssertionResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: false,
            message: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: true,
            message: Some(message.into()),
        }
    }
}

/// One recorded outcome of a test execution unit.
///
/// Every field group is optional so that a sample reduced by a
/// [`ContentMask`](crate::mask::ContentMask) is still a `SampleResult`.
/// A sample produced by a sampler normally carries all groups it has data for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<BaseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<ExtraInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<SampleResult>,
}

impl SampleResult {
    pub fn new(label: impl Into<String>, elapsed_ms: u64, success: bool) -> Self {
        Self {
            base: Some(BaseInfo {
                label: label.into(),
                elapsed_ms,
                success,
            }),
            ..Default::default()
        }
    }

    pub fn with_extra(mut self, extra: ExtraInfo) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn with_response_data(mut self, data: impl Into<String>) -> Self {
        self.response_data = Some(data.into());
        self
    }

    pub fn with_request_data(mut self, data: impl Into<String>) -> Self {
        self.request_data = Some(data.into());
        self
    }

    pub fn with_assertion(mut self, assertion: AssertionResult) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_sub_result(mut self, sub: SampleResult) -> Self {
        self.sub_results.push(sub);
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.base.as_ref().map(|b| b.label.as_str())
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.base.as_ref().map(|b| b.elapsed_ms)
    }

    pub fn is_success(&self) -> Option<bool> {
        self.base.as_ref().map(|b| b.success)
    }
}

/// Write mode, fixed for the lifetime of one open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Keep existing records and write after them.
    Append,
    /// Discard existing records at open time.
    Overwrite,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Append => write!(f, "append"),
            Mode::Overwrite => write!(f, "overwrite"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ResultLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Mode::Append),
            "overwrite" => Ok(Mode::Overwrite),
            other => Err(ResultLogError::InvalidArgument(format!(
                "unknown mode '{other}' (expected append or overwrite)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_builder_accessors() {
        let s = SampleResult::new("login", 42, true)
            .with_response_data("ok")
            .with_assertion(AssertionResult::passed("status"));
        assert_eq!(s.label(), Some("login"));
        assert_eq!(s.elapsed_ms(), Some(42));
        assert_eq!(s.is_success(), Some(true));
        assert_eq!(s.assertions.len(), 1);
        assert!(s.extra.is_none());
    }

    #[test]
    fn test_empty_groups_are_not_serialized() {
        let json = serde_json::to_string(&SampleResult::new("a", 1, false)).unwrap();
        assert_eq!(json, r#"{"base":{"label":"a","elapsed_ms":1,"success":false}}"#);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Append".parse::<Mode>().unwrap(), Mode::Append);
        assert_eq!("overwrite".parse::<Mode>().unwrap(), Mode::Overwrite);
        assert!("truncate".parse::<Mode>().is_err());
    }
}
