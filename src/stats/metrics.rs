//! Direction-specific keyword metrics

use std::fmt;

use super::Analysis;
use super::record::KeywordMetric;
use crate::types::Value;

pub const BURSTS_PER_SECOND: &str = "BURSTS_PER_SECOND";
pub const BURSTS_PER_PUSH: &str = "BURSTS_PER_PUSH";
pub const ELEMENTS_PER_BURST: &str = "ELEMENTS_PER_BURST";
pub const AVERAGE_LATENCY: &str = "AVERAGE_LATENCY";
pub const QUEUE_FLUSHES: &str = "QUEUE_FLUSHES";
pub const DROPPED_BURST_RATIO: &str = "DROPPED_BURST_RATIO";

/// Counters accumulated over the whole life of a statistics engine.
///
/// Unlike the window these are never evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifetimeTotals {
    pub calls: u64,
    pub bursts: u64,
    pub flushes: u32,
    pub dropped: u64,
}

/// Extension point that appends direction-specific keywords to a record.
///
/// The common keywords are always emitted first; a hook may only add to them.
pub trait MetricsHook: fmt::Debug + Send + Sync {
    fn extend_keywords(&self, analysis: &Analysis, totals: &LifetimeTotals, keywords: &mut Vec<KeywordMetric>);
}

/// Sending side of a port: nothing beyond the common keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderMetrics;

impl MetricsHook for SenderMetrics {
    fn extend_keywords(&self, _analysis: &Analysis, _totals: &LifetimeTotals, _keywords: &mut Vec<KeywordMetric>) {}
}

/// Receiving side of a port: reports queue flushes and burst loss once a flush
/// has happened.
///
/// The loss ratio divides every dropped burst by the bursts still in the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverMetrics;

impl MetricsHook for ReceiverMetrics {
    fn extend_keywords(&self, analysis: &Analysis, totals: &LifetimeTotals, keywords: &mut Vec<KeywordMetric>) {
        if totals.flushes == 0 {
            return;
        }

        keywords.push(KeywordMetric::new(QUEUE_FLUSHES, Value::ULong(totals.flushes)));

        let ratio = if analysis.bursts > 0 {
            totals.dropped as f64 / analysis.bursts as f64
        } else {
            0.0
        };
        keywords.push(KeywordMetric::new(DROPPED_BURST_RATIO, Value::Float(ratio as f32)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(bursts: u64) -> Analysis {
        Analysis { calls: bursts as usize, bursts, ..Default::default() }
    }

    #[test]
    fn sender_adds_nothing() {
        let mut keywords = Vec::new();
        let totals = LifetimeTotals { calls: 4, bursts: 4, flushes: 3, dropped: 2 };
        SenderMetrics.extend_keywords(&window_of(4), &totals, &mut keywords);
        assert!(keywords.is_empty());
    }

    #[test]
    fn receiver_reports_only_after_flush() {
        let mut keywords = Vec::new();
        let quiet = LifetimeTotals { calls: 5, bursts: 5, ..Default::default() };
        ReceiverMetrics.extend_keywords(&window_of(5), &quiet, &mut keywords);
        assert!(keywords.is_empty());

        let totals = LifetimeTotals { calls: 5, bursts: 5, flushes: 1, dropped: 2 };
        ReceiverMetrics.extend_keywords(&window_of(5), &totals, &mut keywords);
        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0], KeywordMetric::new(QUEUE_FLUSHES, Value::ULong(1)));
        assert_eq!(keywords[1].id, DROPPED_BURST_RATIO);
        assert_eq!(keywords[1].value, Value::Float(0.4));
    }

    #[test]
    fn receiver_ratio_guarded_without_bursts() {
        let mut keywords = Vec::new();
        let totals = LifetimeTotals { calls: 1, bursts: 0, flushes: 2, dropped: 3 };
        ReceiverMetrics.extend_keywords(&window_of(0), &totals, &mut keywords);
        assert_eq!(keywords[1].value, Value::Float(0.0));
    }

    #[test]
    fn receiver_ratio_uses_window_bursts() {
        let mut keywords = Vec::new();
        let totals = LifetimeTotals { calls: 20, bursts: 20, flushes: 1, dropped: 2 };
        ReceiverMetrics.extend_keywords(&window_of(10), &totals, &mut keywords);
        assert_eq!(keywords[1].value, Value::Float(0.2));
    }
}
