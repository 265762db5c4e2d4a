//! JSON lines: one compact JSON object per `\n`-terminated line.

use std::io::BufRead;

use super::{read_line, LogFormat, RecordCodec};
use crate::error::Result;
use crate::mask::ContentMask;
use crate::models::SampleResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesCodec;

impl RecordCodec for JsonLinesCodec {
    fn format(&self) -> LogFormat {
        LogFormat::JsonLines
    }

    fn encode(&self, sample: &SampleResult, _mask: ContentMask, out: &mut Vec<u8>) -> Result<()> {
        // Compact output escapes embedded newlines, so one record is one line.
        serde_json::to_writer(&mut *out, sample)?;
        out.push(b'\n');
        Ok(())
    }

    fn decode(&self, input: &mut dyn BufRead, _mask: ContentMask) -> Result<Option<SampleResult>> {
        let mut line = String::new();
        loop {
            if !read_line(input, "jsonl", &mut line)? {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Ok(Some(serde_json::from_str(&line)?));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::ResultLogError;

    #[test]
    fn test_multiline_payload_stays_on_one_line() {
        let sample = SampleResult::new("a", 1, true).with_response_data("line1\nline2");
        let mut out = Vec::new();
        JsonLinesCodec.encode(&sample, ContentMask::ALL, &mut out).unwrap();
        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);

        let mut input = Cursor::new(out);
        let decoded = JsonLinesCodec.decode(&mut input, ContentMask::ALL).unwrap();
        assert_eq!(decoded, Some(sample));
        assert_eq!(JsonLinesCodec.decode(&mut input, ContentMask::ALL).unwrap(), None);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut input = Cursor::new(b"\n{\"base\":{\"label\":\"x\",\"elapsed_ms\":3,\"success\":true}}\n\n".to_vec());
        let decoded = JsonLinesCodec.decode(&mut input, ContentMask::ALL).unwrap().unwrap();
        assert_eq!(decoded.label(), Some("x"));
        assert!(JsonLinesCodec.decode(&mut input, ContentMask::ALL).unwrap().is_none());
    }

    #[test]
    fn test_truncated_tail_is_an_error() {
        let mut input = Cursor::new(b"{\"base\":{\"label\"".to_vec());
        assert!(matches!(
            JsonLinesCodec.decode(&mut input, ContentMask::ALL),
            Err(ResultLogError::Codec { format: "jsonl", .. })
        ));
    }
}
