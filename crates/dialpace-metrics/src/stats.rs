//! Aggregation over finalized call records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tracker::CallMetricsRecord;

/// Summary of a set of finalized calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    pub total: usize,
    /// Calls that reached a connected state at some point
    pub delivered_count: usize,
    pub delivered_rate: f64,
    pub status_distribution: BTreeMap<String, usize>,
    pub avg_post_dial_delay_ms: Option<f64>,
    pub avg_answer_delay_ms: Option<f64>,
    pub avg_total_duration_ms: Option<f64>,
}

/// Summarize `records`
///
/// Delivery means `connected_at` is set, whatever the final status. Averages skip
/// records missing the metric and are `None` when nothing contributes.
pub fn compute_stats(records: &[CallMetricsRecord]) -> CallStats {
    let total = records.len();
    let delivered_count = records.iter().filter(|r| r.is_delivered()).count();
    let delivered_rate = if total == 0 {
        0.0
    } else {
        delivered_count as f64 / total as f64
    };

    let mut status_distribution = BTreeMap::new();
    for record in records {
        *status_distribution
            .entry(record.final_status.to_string())
            .or_insert(0) += 1;
    }

    CallStats {
        total,
        delivered_count,
        delivered_rate,
        status_distribution,
        avg_post_dial_delay_ms: average(records.iter().filter_map(|r| r.post_dial_delay_ms)),
        avg_answer_delay_ms: average(records.iter().filter_map(|r| r.answer_delay_ms)),
        avg_total_duration_ms: average(records.iter().filter_map(|r| r.total_duration_ms)),
    }
}

fn average(values: impl Iterator<Item = i64>) -> Option<f64> {
    let (sum, count) = values.fold((0i64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}
