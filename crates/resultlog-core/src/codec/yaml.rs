//! YAML documents: each record is framed by a `---` line and a `...` line.

use std::io::BufRead;

use super::{read_line, LogFormat, RecordCodec};
use crate::error::{Result, ResultLogError};
use crate::mask::ContentMask;
use crate::models::SampleResult;

const DOC_START: &str = "---";
const DOC_END: &str = "...";

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl RecordCodec for YamlCodec {
    fn format(&self) -> LogFormat {
        LogFormat::Yaml
    }

    fn encode(&self, sample: &SampleResult, _mask: ContentMask, out: &mut Vec<u8>) -> Result<()> {
        let body = serde_yaml::to_string(sample)?;
        let body = body.strip_prefix("---\n").unwrap_or(&body);
        out.extend_from_slice(DOC_START.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(body.as_bytes());
        if !body.ends_with('\n') {
            out.push(b'\n');
        }
        out.extend_from_slice(DOC_END.as_bytes());
        out.push(b'\n');
        Ok(())
    }

    fn decode(&self, input: &mut dyn BufRead, _mask: ContentMask) -> Result<Option<SampleResult>> {
        let mut line = String::new();
        loop {
            if !read_line(input, "yaml", &mut line)? {
                return Ok(None);
            }
            match line.trim_end() {
                "" => continue,
                DOC_START => break,
                other => {
                    return Err(ResultLogError::codec(
                        "yaml",
                        format!("expected document start, found '{other}'"),
                    ))
                }
            }
        }

        let mut doc = String::new();
        loop {
            if !read_line(input, "yaml", &mut line)? {
                return Err(ResultLogError::codec("yaml", "document is missing its end marker"));
            }
            if line.trim_end() == DOC_END {
                break;
            }
            doc.push_str(&line);
        }
        Ok(Some(serde_yaml::from_str(&doc)?))
    }
}
