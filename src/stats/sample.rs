//! Per-transfer statistics measurement

use crate::types::TimeValue;

/// One measurement, taken once per push or receive call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsSample {
    pub timestamp: TimeValue,
    pub bursts: u64,
    pub elements: u64,
    /// Queue fill level when the sample was taken
    pub queue_depth: f32,
    /// Seconds between queueing and delivery
    pub delay: f64,
    /// Receiver only: flushes attributed to this sample
    pub flushes: u32,
    /// Receiver only: bursts discarded by those flushes
    pub dropped: u64,
}

impl StatisticsSample {
    pub fn new(timestamp: TimeValue, bursts: u64, elements: u64, queue_depth: f32, delay: f64) -> Self {
        Self { timestamp, bursts, elements, queue_depth, delay, flushes: 0, dropped: 0 }
    }
}
