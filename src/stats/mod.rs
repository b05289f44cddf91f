//! Sliding-window port statistics.
//!
//! Each direction of a port owns a [`WindowedStatistics`] engine. Every transfer
//! records one [`StatisticsSample`]; the engine keeps the most recent
//! [`WINDOW_SIZE`] samples and computes throughput, queue depth and latency over
//! them on demand.
//!
//! Rates are measured over the interval spanned by the window. The oldest
//! retained sample anchors that interval, so its own counts are not part of the
//! rate numerators. Per-call averages (queue depth, latency, bursts per push)
//! use every retained sample.
//!
//! ```rust
//! use sigport::stats::WindowedStatistics;
//! use sigport::types::{TimeCodeMode, TimeValue};
//!
//! let mut stats = WindowedStatistics::sender("dataShort_out", 16.0);
//! for second in 0..10 {
//!     let at = TimeValue::create(1_000.0 + second as f64, 0.0, TimeCodeMode::Cpu);
//!     stats.record_at(at, 1, 1_000, 0.0, 0.0);
//! }
//!
//! let record = stats.retrieve_at(TimeValue::create(1_010.0, 0.0, TimeCodeMode::Cpu));
//! assert_eq!(record.elements_per_second, 1_000.0);
//! assert_eq!(record.bits_per_second, 16_000.0);
//! ```

mod metrics;
mod record;
mod sample;
mod window;

use std::sync::Arc;

use parking_lot::Mutex;

pub use metrics::{
    AVERAGE_LATENCY, BURSTS_PER_PUSH, BURSTS_PER_SECOND, DROPPED_BURST_RATIO, ELEMENTS_PER_BURST, LifetimeTotals,
    MetricsHook, QUEUE_FLUSHES, ReceiverMetrics, SenderMetrics,
};
pub use record::{KeywordMetric, PortStatistics, UsesPortStatistics};
pub use sample::StatisticsSample;
pub use window::SampleWindow;

use crate::types::{TimeValue, Value};

/// Number of samples retained by each statistics engine.
pub const WINDOW_SIZE: usize = 10;

/// Aggregates computed over the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Analysis {
    /// Samples in the window
    pub calls: usize,
    /// Bursts summed over the window
    pub bursts: u64,
    /// Seconds from the oldest to the newest retained sample
    pub elapsed: f64,
    pub elements_per_second: f64,
    pub bursts_per_second: f64,
    pub calls_per_second: f64,
    pub average_queue_depth: f64,
    pub bursts_per_push: f64,
    pub elements_per_burst: f64,
    pub average_latency: f64,
    pub time_since_last_call: f64,
}

/// Fixed-window statistics engine for one port direction.
#[derive(Debug)]
pub struct WindowedStatistics {
    name: String,
    bits_per_element: f64,
    enabled: bool,
    window: SampleWindow<StatisticsSample, WINDOW_SIZE>,
    totals: LifetimeTotals,
    hook: Box<dyn MetricsHook>,
}

impl WindowedStatistics {
    pub fn new(name: impl Into<String>, bits_per_element: f64, hook: Box<dyn MetricsHook>) -> Self {
        Self {
            name: name.into(),
            bits_per_element,
            enabled: true,
            window: SampleWindow::new(),
            totals: LifetimeTotals::default(),
            hook,
        }
    }

    /// Engine for the sending side of a port.
    pub fn sender(name: impl Into<String>, bits_per_element: f64) -> Self {
        Self::new(name, bits_per_element, Box::new(SenderMetrics))
    }

    /// Engine for the receiving side of a port; reports flushes and drops.
    pub fn receiver(name: impl Into<String>, bits_per_element: f64) -> Self {
        Self::new(name, bits_per_element, Box::new(ReceiverMetrics))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn recording on or off. Retained samples are kept either way.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_bit_size(&mut self, bits_per_element: f64) {
        self.bits_per_element = bits_per_element;
    }

    pub fn bits_per_element(&self) -> f64 {
        self.bits_per_element
    }

    /// Record a transfer stamped with the current time.
    pub fn record(&mut self, bursts: u64, elements: u64, queue_depth: f32, delay: f64) {
        self.record_at(TimeValue::now(), bursts, elements, queue_depth, delay);
    }

    /// Record a transfer with an explicit timestamp.
    pub fn record_at(&mut self, timestamp: TimeValue, bursts: u64, elements: u64, queue_depth: f32, delay: f64) {
        if !self.enabled {
            return;
        }

        self.window
            .push(StatisticsSample::new(timestamp, bursts, elements, queue_depth, delay));
        self.totals.calls += 1;
        self.totals.bursts += bursts;
    }

    /// Attribute a queue flush that discarded `bursts_dropped` bursts to the
    /// newest sample.
    ///
    /// # Panics
    ///
    /// Panics if statistics are enabled and nothing has been recorded yet.
    pub fn flush_occurred(&mut self, bursts_dropped: u64) {
        if !self.enabled {
            return;
        }

        let name = &self.name;
        let newest = self.window.newest_mut();
        assert!(
            newest.is_some(),
            "flush_occurred on '{name}' requires at least one recorded sample"
        );
        if let Some(sample) = newest {
            sample.flushes += 1;
            sample.dropped += bursts_dropped;
        }

        self.totals.flushes += 1;
        self.totals.dropped += bursts_dropped;
    }

    /// Calls recorded over the engine's lifetime, including evicted samples.
    pub fn total_calls(&self) -> u64 {
        self.totals.calls
    }

    pub fn totals(&self) -> LifetimeTotals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &StatisticsSample> + '_ {
        self.window.iter()
    }

    /// Compute aggregates over the window as seen at `now`.
    pub fn analyze(&self, now: TimeValue) -> Analysis {
        let (Some(oldest), Some(newest)) = (self.window.oldest(), self.window.newest()) else {
            return Analysis::default();
        };

        let calls = self.window.len();
        let elapsed = newest.timestamp.difference(&oldest.timestamp);

        let mut bursts = 0u64;
        let mut elements = 0u64;
        let mut queue_depth = 0.0f64;
        let mut delay = 0.0f64;
        for sample in self.window.iter() {
            bursts += sample.bursts;
            elements += sample.elements;
            queue_depth += f64::from(sample.queue_depth);
            delay += sample.delay;
        }

        let per_second = |count: f64| if elapsed > 0.0 { count / elapsed } else { 0.0 };

        Analysis {
            calls,
            bursts,
            elapsed,
            elements_per_second: per_second((elements - oldest.elements) as f64),
            bursts_per_second: per_second((bursts - oldest.bursts) as f64),
            calls_per_second: per_second((calls - 1) as f64),
            average_queue_depth: queue_depth / calls as f64,
            bursts_per_push: bursts as f64 / calls as f64,
            elements_per_burst: if bursts > 0 { elements as f64 / bursts as f64 } else { 0.0 },
            average_latency: delay / calls as f64,
            time_since_last_call: now.difference(&newest.timestamp),
        }
    }

    /// Statistics record as of the current time.
    pub fn retrieve(&self) -> PortStatistics {
        self.retrieve_at(TimeValue::now())
    }

    /// Statistics record as seen at `now`.
    pub fn retrieve_at(&self, now: TimeValue) -> PortStatistics {
        let analysis = self.analyze(now);

        let mut keywords = vec![
            KeywordMetric::new(BURSTS_PER_SECOND, Value::Float(analysis.bursts_per_second as f32)),
            KeywordMetric::new(BURSTS_PER_PUSH, Value::Float(analysis.bursts_per_push as f32)),
            KeywordMetric::new(ELEMENTS_PER_BURST, Value::Float(analysis.elements_per_burst as f32)),
            KeywordMetric::new(AVERAGE_LATENCY, Value::Float(analysis.average_latency as f32)),
        ];
        self.hook.extend_keywords(&analysis, &self.totals, &mut keywords);

        PortStatistics {
            port_name: self.name.clone(),
            elements_per_second: analysis.elements_per_second as f32,
            bits_per_second: (analysis.elements_per_second * self.bits_per_element) as f32,
            calls_per_second: analysis.calls_per_second as f32,
            timestamps: Vec::new(),
            average_queue_depth: analysis.average_queue_depth as f32,
            time_since_last_call: analysis.time_since_last_call as f32,
            keywords,
        }
    }
}

/// Statistics engine shared between a port and whoever polls it.
///
/// Record, flush and retrieve are serialized by a single lock; none of them
/// blocks for longer than one pass over the window.
#[derive(Debug, Clone)]
pub struct SharedStatistics(Arc<Mutex<WindowedStatistics>>);

impl SharedStatistics {
    pub fn new(statistics: WindowedStatistics) -> Self {
        Self(Arc::new(Mutex::new(statistics)))
    }

    pub fn record(&self, bursts: u64, elements: u64, queue_depth: f32, delay: f64) {
        self.0.lock().record(bursts, elements, queue_depth, delay);
    }

    pub fn record_at(&self, timestamp: TimeValue, bursts: u64, elements: u64, queue_depth: f32, delay: f64) {
        self.0.lock().record_at(timestamp, bursts, elements, queue_depth, delay);
    }

    pub fn flush_occurred(&self, bursts_dropped: u64) {
        self.0.lock().flush_occurred(bursts_dropped);
    }

    pub fn retrieve(&self) -> PortStatistics {
        self.0.lock().retrieve()
    }

    pub fn retrieve_at(&self, now: TimeValue) -> PortStatistics {
        self.0.lock().retrieve_at(now)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.lock().set_enabled(enabled);
    }

    pub fn set_bit_size(&self, bits_per_element: f64) {
        self.0.lock().set_bit_size(bits_per_element);
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut WindowedStatistics) -> R) -> R {
        f(&mut self.0.lock())
    }
}

impl From<WindowedStatistics> for SharedStatistics {
    fn from(statistics: WindowedStatistics) -> Self {
        Self::new(statistics)
    }
}
