//! Aggregate statistics over replayed samples.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::SampleResult;

/// Timing and error totals for one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub label: String,
    pub samples: u64,
    pub errors: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    /// 90th percentile, nearest-rank.
    pub p90_ms: u64,
}

impl LabelSummary {
    fn from_elapsed(label: String, mut elapsed: Vec<u64>, errors: u64) -> Self {
        elapsed.sort_unstable();
        let samples = elapsed.len() as u64;
        let sum: u64 = elapsed.iter().sum();
        let rank = ((elapsed.len() as f64) * 0.9).ceil() as usize;
        Self {
            label,
            samples,
            errors,
            min_ms: elapsed.first().copied().unwrap_or(0),
            max_ms: elapsed.last().copied().unwrap_or(0),
            mean_ms: if samples == 0 {
                0.0
            } else {
                sum as f64 / samples as f64
            },
            p90_ms: elapsed.get(rank.saturating_sub(1)).copied().unwrap_or(0),
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.errors as f64 / self.samples as f64
        }
    }
}

/// Per-label summaries in first-seen order, followed by a `TOTAL` row.
///
/// Only top-level samples are counted. Samples recorded without base info
/// carry no label or timing and are skipped.
pub fn summarize(samples: &[SampleResult]) -> Vec<LabelSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Vec<u64>, u64)> = HashMap::new();
    let mut all_elapsed = Vec::new();
    let mut all_errors = 0;

    for base in samples.iter().filter_map(|s| s.base.as_ref()) {
        let entry = groups.entry(base.label.clone()).or_insert_with(|| {
            order.push(base.label.clone());
            (Vec::new(), 0)
        });
        entry.0.push(base.elapsed_ms);
        all_elapsed.push(base.elapsed_ms);
        if !base.success {
            entry.1 += 1;
            all_errors += 1;
        }
    }

    let mut summaries: Vec<LabelSummary> = order
        .into_iter()
        .filter_map(|label| {
            let (elapsed, errors) = groups.remove(&label)?;
            Some(LabelSummary::from_elapsed(label, elapsed, errors))
        })
        .collect();
    if !summaries.is_empty() {
        summaries.push(LabelSummary::from_elapsed(
            "TOTAL".to_string(),
            all_elapsed,
            all_errors,
        ));
    }
    summaries
}
