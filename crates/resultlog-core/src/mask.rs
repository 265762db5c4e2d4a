//! Content selection: which field groups of a sample get persisted.
//!
//! Bit layout (stable across all formats):
//!
//! | bit | flag                | field group                                              |
//! |-----|---------------------|----------------------------------------------------------|
//! | 0   | `BASE_INFO`         | label, elapsed time, success                             |
//! | 1   | `EXTRA_INFO`        | thread name, timestamp, response code/message, data type |
//! | 2   | `SUB_RESULTS`       | nested samples, reduced with the same mask               |
//! | 3   | `RESPONSE`          | response data                                            |
//! | 4   | `REQUEST_DATA`      | request data                                             |
//! | 5   | `ASSERTION_RESULTS` | assertion outcomes and messages                          |

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ResultLogError};
use crate::models::SampleResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentMask(u8);

impl ContentMask {
    pub const NONE: ContentMask = ContentMask(0);
    pub const BASE_INFO: ContentMask = ContentMask(1 << 0);
    pub const EXTRA_INFO: ContentMask = ContentMask(1 << 1);
    pub const SUB_RESULTS: ContentMask = ContentMask(1 << 2);
    pub const RESPONSE: ContentMask = ContentMask(1 << 3);
    pub const REQUEST_DATA: ContentMask = ContentMask(1 << 4);
    pub const ASSERTION_RESULTS: ContentMask = ContentMask(1 << 5);

    /// Every defined flag, in bit order.
    pub const FLAGS: [(ContentMask, &'static str); 6] = [
        (Self::BASE_INFO, "base_info"),
        (Self::EXTRA_INFO, "extra_info"),
        (Self::SUB_RESULTS, "sub_results"),
        (Self::RESPONSE, "response"),
        (Self::REQUEST_DATA, "request_data"),
        (Self::ASSERTION_RESULTS, "assertion_results"),
    ];

    pub const ALL: ContentMask = ContentMask(
        Self::BASE_INFO.0
            | Self::EXTRA_INFO.0
            | Self::SUB_RESULTS.0
            | Self::RESPONSE.0
            | Self::REQUEST_DATA.0
            | Self::ASSERTION_RESULTS.0,
    );

    /// Validates a raw bit pattern. Negative values and any bit above bit 5
    /// are rejected.
    pub fn from_bits(bits: i64) -> Result<Self> {
        Self::from_wide(bits.into())
    }

    // Wide enough for every built-in integer type.
    fn from_wide(bits: i128) -> Result<Self> {
        if bits < 0 || bits & !i128::from(Self::ALL.0) != 0 {
            return Err(ResultLogError::InvalidMask(bits));
        }
        Ok(ContentMask(bits as u8))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: ContentMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: ContentMask) -> ContentMask {
        ContentMask(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set flags, in bit order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::FLAGS
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }

    /// Produces the reduced view of `sample` that this mask selects.
    ///
    /// Sub-results are kept only when `SUB_RESULTS` is set, and each of them
    /// is reduced with this same mask. The tree is walked with an explicit
    /// stack so nesting depth is bounded by heap, not by the call stack.
    pub fn apply(self, sample: &SampleResult) -> SampleResult {
        struct Frame<'a> {
            source: &'a SampleResult,
            reduced: SampleResult,
            next_child: usize,
        }

        let descend = self.contains(Self::SUB_RESULTS);
        let mut stack = vec![Frame {
            source: sample,
            reduced: self.reduce_fields(sample),
            next_child: 0,
        }];
        let mut root = None;

        while let Some(mut frame) = stack.pop() {
            if descend {
                if let Some(child) = frame.source.sub_results.get(frame.next_child) {
                    frame.next_child += 1;
                    stack.push(frame);
                    stack.push(Frame {
                        source: child,
                        reduced: self.reduce_fields(child),
                        next_child: 0,
                    });
                    continue;
                }
            }
            match stack.last_mut() {
                Some(parent) => parent.reduced.sub_results.push(frame.reduced),
                None => root = Some(frame.reduced),
            }
        }

        root.unwrap_or_default()
    }

    /// Copies the selected field groups of one node, without its children.
    fn reduce_fields(self, sample: &SampleResult) -> SampleResult {
        SampleResult {
            base: self
                .contains(Self::BASE_INFO)
                .then(|| sample.base.clone())
                .flatten(),
            extra: self
                .contains(Self::EXTRA_INFO)
                .then(|| sample.extra.clone())
                .flatten(),
            response_data: self
                .contains(Self::RESPONSE)
                .then(|| sample.response_data.clone())
                .flatten(),
            request_data: self
                .contains(Self::REQUEST_DATA)
                .then(|| sample.request_data.clone())
                .flatten(),
            assertions: if self.contains(Self::ASSERTION_RESULTS) {
                sample.assertions.clone()
            } else {
                Vec::new()
            },
            sub_results: Vec::new(),
        }
    }
}

impl BitOr for ContentMask {
    type Output = ContentMask;

    fn bitor(self, rhs: ContentMask) -> ContentMask {
        self.union(rhs)
    }
}

impl BitOrAssign for ContentMask {
    fn bitor_assign(&mut self, rhs: ContentMask) {
        *self = self.union(rhs);
    }
}

macro_rules! impl_try_from_int {
    ($($int:ty),*) => {$(
        impl TryFrom<$int> for ContentMask {
            type Error = ResultLogError;

            fn try_from(bits: $int) -> Result<Self> {
                ContentMask::from_wide(i128::from(bits))
            }
        }
    )*};
}

impl_try_from_int!(u8, u16, u32, u64, i32, i64);

impl fmt::Display for ContentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.names().collect();
        write!(f, "{}", names.join("|"))
    }
}

impl FromStr for ContentMask {
    type Err = ResultLogError;

    /// Accepts `all`, `none`, a decimal or `0x` hex integer, or flag names
    /// separated by `,` or `|`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "all" => return Ok(Self::ALL),
            "none" | "" => return Ok(Self::NONE),
            _ => {}
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let bits = i64::from_str_radix(hex, 16)
                .map_err(|e| ResultLogError::InvalidArgument(format!("mask '{s}': {e}")))?;
            return Self::from_bits(bits);
        }
        if let Ok(bits) = s.parse::<i64>() {
            return Self::from_bits(bits);
        }
        s.split(|c: char| c == ',' || c == '|')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Self::NONE, |mask, name| -> Result<ContentMask> {
                Ok(mask | flag_by_name(name)?)
            })
    }
}

fn flag_by_name(name: &str) -> Result<ContentMask> {
    let wanted = name.to_ascii_lowercase();
    ContentMask::FLAGS
        .into_iter()
        .find(|(_, flag_name)| *flag_name == wanted)
        .map(|(flag, _)| flag)
        .ok_or_else(|| ResultLogError::InvalidArgument(format!("unknown mask flag '{name}'")))
}

impl Serialize for ContentMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

impl<'de> Deserialize<'de> for ContentMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bits(i64),
            Names(Vec<String>),
            Text(String),
        }

        let mask = match Repr::deserialize(deserializer)? {
            Repr::Bits(bits) => ContentMask::from_bits(bits),
            Repr::Names(names) => {
                names
                    .iter()
                    .try_fold(ContentMask::NONE, |mask, name| -> Result<ContentMask> {
                        Ok(mask | flag_by_name(name)?)
                    })
            }
            Repr::Text(text) => text.parse(),
        };
        mask.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::models::{AssertionResult, ExtraInfo};

    fn full_sample() -> SampleResult {
        SampleResult::new("parent", 120, true)
            .with_extra(ExtraInfo::current("200", "OK"))
            .with_response_data("<html/>")
            .with_request_data("GET /")
            .with_assertion(AssertionResult::failed("size", "too large"))
            .with_sub_result(SampleResult::new("child-1", 40, true).with_response_data("a"))
            .with_sub_result(
                SampleResult::new("child-2", 80, false)
                    .with_sub_result(SampleResult::new("grandchild", 5, true)),
            )
    }

    #[test]
    fn test_bit_positions_are_fixed() {
        assert_eq!(ContentMask::BASE_INFO.bits(), 0x01);
        assert_eq!(ContentMask::EXTRA_INFO.bits(), 0x02);
        assert_eq!(ContentMask::SUB_RESULTS.bits(), 0x04);
        assert_eq!(ContentMask::RESPONSE.bits(), 0x08);
        assert_eq!(ContentMask::REQUEST_DATA.bits(), 0x10);
        assert_eq!(ContentMask::ASSERTION_RESULTS.bits(), 0x20);
        assert_eq!(ContentMask::ALL.bits(), 0x3F);
    }

    #[test]
    fn test_base_info_only_strips_everything_else() {
        let reduced = ContentMask::BASE_INFO.apply(&full_sample());
        assert_eq!(reduced.label(), Some("parent"));
        assert!(reduced.extra.is_none());
        assert!(reduced.response_data.is_none());
        assert!(reduced.request_data.is_none());
        assert!(reduced.assertions.is_empty());
        assert!(reduced.sub_results.is_empty());
    }

    #[test]
    fn test_sub_results_reduced_with_same_mask() {
        let mask = ContentMask::BASE_INFO | ContentMask::SUB_RESULTS;
        let reduced = mask.apply(&full_sample());
        assert_eq!(reduced.sub_results.len(), 2);
        assert_eq!(reduced.sub_results[0].label(), Some("child-1"));
        assert!(reduced.sub_results[0].response_data.is_none());
        assert_eq!(reduced.sub_results[1].sub_results.len(), 1);
        assert_eq!(
            reduced.sub_results[1].sub_results[0].label(),
            Some("grandchild")
        );
    }

    #[test]
    fn test_all_mask_is_identity() {
        let sample = full_sample();
        assert_eq!(ContentMask::ALL.apply(&sample), sample);
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut sample = SampleResult::new("leaf", 1, true);
        for depth in 0..100_000 {
            sample = SampleResult::new(format!("level-{depth}"), 1, true).with_sub_result(sample);
        }
        let reduced = ContentMask::ALL.apply(&sample);
        assert_eq!(reduced.label(), Some("level-99999"));
        // Tear the chain down iteratively; the derived Drop would recurse.
        let mut pending = vec![sample, reduced];
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.sub_results);
        }
    }

    #[test]
    fn test_parse_names_and_numbers() {
        assert_eq!(
            "base_info,extra_info".parse::<ContentMask>().unwrap(),
            ContentMask::BASE_INFO | ContentMask::EXTRA_INFO
        );
        assert_eq!(
            "BASE_INFO|response".parse::<ContentMask>().unwrap(),
            ContentMask::BASE_INFO | ContentMask::RESPONSE
        );
        assert_eq!("0x3f".parse::<ContentMask>().unwrap(), ContentMask::ALL);
        assert_eq!("5".parse::<ContentMask>().unwrap().bits(), 5);
        assert_eq!("all".parse::<ContentMask>().unwrap(), ContentMask::ALL);
        assert!(matches!(
            "0x40".parse::<ContentMask>(),
            Err(ResultLogError::InvalidMask(0x40))
        ));
        assert!(matches!(
            "headers".parse::<ContentMask>(),
            Err(ResultLogError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ContentMask::NONE.to_string(), "none");
        assert_eq!(
            (ContentMask::BASE_INFO | ContentMask::SUB_RESULTS).to_string(),
            "base_info|sub_results"
        );
    }

    #[test]
    fn test_yaml_accepts_list_or_integer() {
        let from_list: ContentMask = serde_yaml::from_str("[base_info, response]").unwrap();
        assert_eq!(from_list, ContentMask::BASE_INFO | ContentMask::RESPONSE);
        let from_int: ContentMask = serde_yaml::from_str("3").unwrap();
        assert_eq!(from_int, ContentMask::BASE_INFO | ContentMask::EXTRA_INFO);
        assert!(serde_yaml::from_str::<ContentMask>("64").is_err());
        let text = serde_yaml::to_string(&from_list).unwrap();
        assert_eq!(serde_yaml::from_str::<ContentMask>(&text).unwrap(), from_list);
    }

    #[test]
    fn test_wide_integers_report_their_value() {
        assert!(matches!(
            ContentMask::try_from(u64::MAX),
            Err(ResultLogError::InvalidMask(b)) if b == i128::from(u64::MAX)
        ));
        assert!(matches!(
            ContentMask::try_from(1u64 << 63),
            Err(ResultLogError::InvalidMask(b)) if b == 1i128 << 63
        ));
        assert!(matches!(
            ContentMask::try_from(u32::MAX),
            Err(ResultLogError::InvalidMask(4_294_967_295))
        ));
        assert_eq!(ContentMask::try_from(63u64).unwrap(), ContentMask::ALL);
    }

    proptest! {
        #[test]
        fn valid_range_always_accepted(bits in 0i64..=63) {
            prop_assert_eq!(ContentMask::from_bits(bits).unwrap().bits() as i64, bits);
        }

        #[test]
        fn out_of_range_always_rejected(bits in prop_oneof![i64::MIN..0i64, 64i64..=i64::MAX]) {
            prop_assert!(matches!(
                ContentMask::from_bits(bits),
                Err(ResultLogError::InvalidMask(b)) if b == i128::from(bits)
            ));
        }
    }
}
