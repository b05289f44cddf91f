//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Provides a recording [`Transport`], timestamp and descriptor shorthands, and a
//! one-shot tracing subscriber.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::{Arc, Once};

use parking_lot::Mutex;

use crate::port::{Packet, Transport};
use crate::types::{StreamDescriptor, TimeCodeMode, TimeValue};
use crate::{PortError, Result};

/// Install a fmt subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// CPU-clock timestamp at a whole number of seconds.
pub fn time_at(seconds: f64) -> TimeValue {
    TimeValue::create(seconds, 0.0, TimeCodeMode::Cpu)
}

/// Scalar descriptor with time units.
pub fn descriptor(stream_id: &str, sample_rate: f64) -> StreamDescriptor {
    StreamDescriptor::create(stream_id, sample_rate, crate::types::UNITS_TIME, false)
}

struct Recorded<T> {
    descriptors: Vec<StreamDescriptor>,
    packets: Vec<Packet<T>>,
}

/// Transport that keeps everything pushed to it.
///
/// Clones share the same recording, so a test can hand one clone to a port and
/// inspect the other.
pub struct RecordingTransport<T> {
    recorded: Arc<Mutex<Recorded<T>>>,
    fail: bool,
}

impl<T> Clone for RecordingTransport<T> {
    fn clone(&self) -> Self {
        Self { recorded: self.recorded.clone(), fail: self.fail }
    }
}

impl<T> Default for RecordingTransport<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordingTransport<T> {
    pub fn new() -> Self {
        Self {
            recorded: Arc::new(Mutex::new(Recorded { descriptors: Vec::new(), packets: Vec::new() })),
            fail: false,
        }
    }

    /// Transport whose every push fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.recorded.lock().descriptors.clone()
    }

    pub fn packets(&self) -> Vec<Packet<T>>
    where
        T: Clone,
    {
        self.recorded.lock().packets.clone()
    }

    pub fn packet_count(&self) -> usize {
        self.recorded.lock().packets.len()
    }
}

#[async_trait::async_trait]
impl<T> Transport<T> for RecordingTransport<T>
where
    T: Send + 'static,
{
    async fn push_sri(&self, descriptor: &StreamDescriptor) -> Result<()> {
        if self.fail {
            return Err(PortError::transport_failed("recording", "configured to fail"));
        }
        self.recorded.lock().descriptors.push(descriptor.clone());
        Ok(())
    }

    async fn push_packet(&self, packet: Packet<T>) -> Result<()> {
        if self.fail {
            return Err(PortError::transport_failed("recording", "configured to fail"));
        }
        self.recorded.lock().packets.push(packet);
        Ok(())
    }
}
