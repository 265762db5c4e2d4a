//! CSV rows whose columns are selected by the content mask.
//!
//! Columns, in order, for each set flag:
//!
//! - `SUB_RESULTS`: number of direct children (their rows follow, pre-order)
//! - `BASE_INFO`: label, elapsed_ms, success
//! - `EXTRA_INFO`: thread_name, timestamp (RFC 3339), response_code,
//!   response_message, data_type
//! - `RESPONSE`: response data
//! - `REQUEST_DATA`: request data
//! - `ASSERTION_RESULTS`: assertions as a JSON array
//!
//! An absent group is written as empty unquoted fields; a present but empty
//! string is written as `""`. The log starts with a header row naming the
//! columns, so rows are always decoded with the layout they were written in.

use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{read_line, LogFormat, RecordCodec};
use crate::error::{Result, ResultLogError};
use crate::mask::ContentMask;
use crate::models::{AssertionResult, BaseInfo, ExtraInfo, SampleResult};

const FORMAT: &str = "csv";

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl CsvCodec {
    /// Column names for `mask`, in row order.
    pub fn header(mask: ContentMask) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if mask.contains(ContentMask::SUB_RESULTS) {
            columns.push("sub_results");
        }
        if mask.contains(ContentMask::BASE_INFO) {
            columns.extend(["label", "elapsed_ms", "success"]);
        }
        if mask.contains(ContentMask::EXTRA_INFO) {
            columns.extend([
                "thread_name",
                "timestamp",
                "response_code",
                "response_message",
                "data_type",
            ]);
        }
        if mask.contains(ContentMask::RESPONSE) {
            columns.push("response_data");
        }
        if mask.contains(ContentMask::REQUEST_DATA) {
            columns.push("request_data");
        }
        if mask.contains(ContentMask::ASSERTION_RESULTS) {
            columns.push("assertions");
        }
        columns
    }

    fn encode_row(sample: &SampleResult, mask: ContentMask, out: &mut Vec<u8>) -> Result<()> {
        let mut row = RowWriter::default();
        if mask.contains(ContentMask::SUB_RESULTS) {
            row.plain(Some(sample.sub_results.len().to_string()));
        }
        if mask.contains(ContentMask::BASE_INFO) {
            let base = sample.base.as_ref();
            row.text(base.map(|b| b.label.as_str()));
            row.plain(base.map(|b| b.elapsed_ms.to_string()));
            row.plain(base.map(|b| b.success.to_string()));
        }
        if mask.contains(ContentMask::EXTRA_INFO) {
            let extra = sample.extra.as_ref();
            row.text(extra.map(|e| e.thread_name.as_str()));
            row.plain(extra.map(|e| e.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
            row.text(extra.map(|e| e.response_code.as_str()));
            row.text(extra.map(|e| e.response_message.as_str()));
            row.text(extra.map(|e| e.data_type.as_str()));
        }
        if mask.contains(ContentMask::RESPONSE) {
            row.text(sample.response_data.as_deref());
        }
        if mask.contains(ContentMask::REQUEST_DATA) {
            row.text(sample.request_data.as_deref());
        }
        if mask.contains(ContentMask::ASSERTION_RESULTS) {
            if sample.assertions.is_empty() {
                row.text(None);
            } else {
                let json = serde_json::to_string(&sample.assertions)?;
                row.text(Some(json.as_str()));
            }
        }
        out.extend_from_slice(row.finish().as_bytes());
        Ok(())
    }

    /// Parses one row into a sample (without children) and its child count.
    fn decode_row(fields: Vec<Field>, mask: ContentMask) -> Result<(SampleResult, usize)> {
        let expected = Self::header(mask).len();
        let fields = if expected == 0 && fields.len() == 1 && fields[0].is_absent() {
            Vec::new()
        } else {
            fields
        };
        if fields.len() != expected {
            return Err(ResultLogError::codec(
                FORMAT,
                format!(
                    "expected {expected} fields for mask {mask}, found {}",
                    fields.len()
                ),
            ));
        }

        let mut fields = Fields(fields.into_iter());
        let mut sample = SampleResult::default();
        let mut children = 0;

        if mask.contains(ContentMask::SUB_RESULTS) {
            children = fields.parsed("sub_results")?.unwrap_or(0);
        }
        if mask.contains(ContentMask::BASE_INFO) {
            let label = fields.text();
            let elapsed_ms = fields.parsed("elapsed_ms")?;
            let success = fields.parsed("success")?;
            sample.base = match (label, elapsed_ms, success) {
                (None, None, None) => None,
                (Some(label), Some(elapsed_ms), Some(success)) => Some(BaseInfo {
                    label,
                    elapsed_ms,
                    success,
                }),
                _ => return Err(ResultLogError::codec(FORMAT, "incomplete base info")),
            };
        }
        if mask.contains(ContentMask::EXTRA_INFO) {
            let thread_name = fields.text();
            let timestamp = fields.text();
            let response_code = fields.text();
            let response_message = fields.text();
            let data_type = fields.text();
            sample.extra = match (thread_name, timestamp, response_code, response_message, data_type) {
                (None, None, None, None, None) => None,
                (
                    Some(thread_name),
                    Some(timestamp),
                    Some(response_code),
                    Some(response_message),
                    Some(data_type),
                ) => Some(ExtraInfo {
                    thread_name,
                    timestamp: parse_timestamp(&timestamp)?,
                    response_code,
                    response_message,
                    data_type,
                }),
                _ => return Err(ResultLogError::codec(FORMAT, "incomplete extra info")),
            };
        }
        if mask.contains(ContentMask::RESPONSE) {
            sample.response_data = fields.text();
        }
        if mask.contains(ContentMask::REQUEST_DATA) {
            sample.request_data = fields.text();
        }
        if mask.contains(ContentMask::ASSERTION_RESULTS) {
            if let Some(json) = fields.text() {
                sample.assertions = serde_json::from_str::<Vec<AssertionResult>>(&json)?;
            }
        }
        Ok((sample, children))
    }
}

impl RecordCodec for CsvCodec {
    fn format(&self) -> LogFormat {
        LogFormat::Csv
    }

    fn encode(&self, sample: &SampleResult, mask: ContentMask, out: &mut Vec<u8>) -> Result<()> {
        if !mask.contains(ContentMask::SUB_RESULTS) {
            return Self::encode_row(sample, mask, out);
        }
        // Pre-order: a parent row, then each child subtree in order.
        let mut pending = vec![sample];
        while let Some(node) = pending.pop() {
            Self::encode_row(node, mask, out)?;
            pending.extend(node.sub_results.iter().rev());
        }
        Ok(())
    }

    fn layout_header(&self, mask: ContentMask) -> Option<String> {
        Some(Self::header(mask).join(",") + "\n")
    }

    fn read_layout(&self, input: &mut dyn BufRead) -> Result<Option<ContentMask>> {
        let fields = read_row(input)?
            .ok_or_else(|| ResultLogError::codec(FORMAT, "log has no header row"))?;
        let columns: Vec<String> = match fields.as_slice() {
            [only] if only.is_absent() => Vec::new(),
            _ => fields.into_iter().map(|f| f.text).collect(),
        };
        (0..=ContentMask::ALL.bits())
            .filter_map(|bits| ContentMask::try_from(bits).ok())
            .find(|mask| Self::header(*mask) == columns)
            .map(Some)
            .ok_or_else(|| {
                ResultLogError::codec(
                    FORMAT,
                    format!("unrecognized header row '{}'", columns.join(",")),
                )
            })
    }

    fn decode(&self, input: &mut dyn BufRead, mask: ContentMask) -> Result<Option<SampleResult>> {
        struct Pending {
            sample: SampleResult,
            remaining: usize,
        }

        let Some(fields) = read_row(input)? else {
            return Ok(None);
        };
        let (sample, remaining) = Self::decode_row(fields, mask)?;
        if !mask.contains(ContentMask::SUB_RESULTS) {
            return Ok(Some(sample));
        }

        let mut stack = vec![Pending { sample, remaining }];
        let mut root = None;
        while let Some(mut top) = stack.pop() {
            if top.remaining > 0 {
                top.remaining -= 1;
                let fields = read_row(input)?.ok_or_else(|| {
                    ResultLogError::codec(FORMAT, "log ends before all sub-results were read")
                })?;
                let (child, remaining) = Self::decode_row(fields, mask)?;
                stack.push(top);
                stack.push(Pending {
                    sample: child,
                    remaining,
                });
                continue;
            }
            match stack.last_mut() {
                Some(parent) => parent.sample.sub_results.push(top.sample),
                None => root = Some(top.sample),
            }
        }
        Ok(root)
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ResultLogError::codec(FORMAT, format!("bad timestamp '{text}': {e}")))
}

// ─── Row encoding ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RowWriter {
    line: String,
    fields: usize,
}

impl RowWriter {
    fn separator(&mut self) {
        if self.fields > 0 {
            self.line.push(',');
        }
        self.fields += 1;
    }

    /// A value that never needs quoting (numbers, booleans, timestamps).
    fn plain(&mut self, value: Option<String>) {
        self.separator();
        if let Some(value) = value {
            self.line.push_str(&value);
        }
    }

    /// A free-form string, quoted when empty or when it holds `,` `"` or a
    /// line break.
    fn text(&mut self, value: Option<&str>) {
        self.separator();
        if let Some(value) = value {
            self.line.push_str(&quote_field(value));
        }
    }

    fn finish(mut self) -> String {
        self.line.push('\n');
        self.line
    }
}

/// Quotes `value` for a CSV cell when it is empty or holds `,` `"` or a line
/// break.
pub(crate) fn quote_field(value: &str) -> Cow<'_, str> {
    if value.is_empty() || value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

// ─── Row decoding ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn is_absent(&self) -> bool {
        !self.quoted && self.text.is_empty()
    }
}

struct Fields(std::vec::IntoIter<Field>);

impl Fields {
    fn text(&mut self) -> Option<String> {
        self.0
            .next()
            .filter(|f| !f.is_absent())
            .map(|f| f.text)
    }

    fn parsed<T: FromStr>(&mut self, column: &str) -> Result<Option<T>> {
        match self.text() {
            None => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| {
                ResultLogError::codec(FORMAT, format!("bad {column} value '{text}'"))
            }),
        }
    }
}

/// Reads one logical row; quoted fields may span physical lines.
fn read_row(input: &mut dyn BufRead) -> Result<Option<Vec<Field>>> {
    let mut line = String::new();
    if !read_line(input, FORMAT, &mut line)? {
        return Ok(None);
    }
    let mut row = line.clone();
    loop {
        if let Some(fields) = split_row(&row) {
            return Ok(Some(fields));
        }
        if !read_line(input, FORMAT, &mut line)? {
            return Err(ResultLogError::codec(FORMAT, "unterminated quoted field"));
        }
        row.push_str(&line);
    }
}

/// Splits a `\n`-terminated row into fields, or returns `None` when a quoted
/// field is still open at the end of the text.
fn split_row(row: &str) -> Option<Vec<Field>> {
    let body = row.strip_suffix('\n').unwrap_or(row);
    let body = body.strip_suffix('\r').unwrap_or(body);

    let mut fields = Vec::new();
    let mut current = Field::default();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.text.push('"');
                }
                '"' => in_quotes = false,
                _ => current.text.push(c),
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut current)),
                '"' => {
                    in_quotes = true;
                    current.quoted = true;
                }
                _ => current.text.push(c),
            }
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(current);
    Some(fields)
}
