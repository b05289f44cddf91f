//! Stream metadata, precision timestamps and port telemetry for signal-processing
//! pipelines.
//!
//! Sigport moves bulk sample data between pipeline stages over typed ports. Every
//! stream carries a side channel of metadata (the stream descriptor, or SRI) and
//! every packet a two-part precision timestamp.
//!
//! # Features
//!
//! - **Stream descriptors**: field-by-field comparison and change bitmasks that
//!   decide when downstream consumers must hear about new metadata
//! - **Precision time**: whole plus fractional seconds with exact normalization
//!   and per-sample offsets
//! - **Port statistics**: a sliding window over recent transfers reporting
//!   throughput, queue depth, latency and loss
//! - **Ports**: async output fan-out with transfer chunking, and input queues with
//!   flush-on-overflow or back-pressure
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use sigport::{PortConfig, Sigport};
//! use sigport::types::{StreamDescriptor, TimeValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let output = Sigport::output::<i16>(&PortConfig::named("dataShort_out"))?;
//! let input = Sigport::input::<i16>(&PortConfig::from_yaml("name: dataShort_in\nqueue_threshold: 8")?)?;
//! output.connect("conn-1", input.clone()).await?;
//!
//! output.push_sri(StreamDescriptor::create("ramp", 1_000.0, 1, false)).await?;
//! output.push_packet((0..64).collect(), TimeValue::now(), true, "ramp").await?;
//!
//! let transfer = input.get_packet(Duration::from_millis(100)).await?;
//! assert!(transfer.end_of_stream);
//! println!("{}", transfer.time);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

pub mod port;
pub mod stats;
pub mod stream;
pub mod types;

use std::sync::Arc;

// Core exports
pub use config::PortConfig;
pub use error::*;

pub use port::{
    DataTransfer, InPort, OutPort, Packet, PollerChannels, StatisticsPoller, StatisticsSource, StreamRoute, Transport,
};
pub use stats::{PortStatistics, SharedStatistics, UsesPortStatistics, WindowedStatistics};
pub use types::{StreamDescriptor, TimeValue};

/// Unified entry point for building ports from configuration.
pub struct Sigport;

impl Sigport {
    /// Build an output port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] if the configuration does not validate.
    pub fn output<T>(config: &PortConfig) -> Result<OutPort<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        config.validate()?;
        let mut port = OutPort::with_limits(config.name.clone(), config.bits_for::<T>(), config.max_transfer_bytes)
            .with_routes(config.routes.iter().cloned());
        port.set_statistics_enabled(config.statistics_enabled);
        Ok(port)
    }

    /// Build an input port, shared so it can be connected to output ports.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] if the configuration does not validate.
    pub fn input<T>(config: &PortConfig) -> Result<Arc<InPort<T>>>
    where
        T: Send + 'static,
    {
        config.validate()?;
        let port = InPort::with_statistics(config.name.clone(), config.bits_for::<T>());
        port.set_queue_threshold(config.queue_threshold)?;
        port.set_blocking(config.blocking);
        port.set_statistics_enabled(config.statistics_enabled);
        Ok(Arc::new(port))
    }

    /// Start polling statistics from `sources` at the configured interval.
    pub fn poll(sources: Vec<Arc<dyn StatisticsSource>>, config: &PortConfig) -> PollerChannels {
        StatisticsPoller::spawn(sources, config.poll_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_applies_configuration() {
        let config = PortConfig::from_yaml("name: p\nqueue_threshold: 7\nblocking: true\nbits_per_element: 12").unwrap();

        let input = Sigport::input::<i16>(&config).unwrap();
        assert_eq!(input.queue_threshold(), 7);
        assert!(input.is_blocking());

        let output = Sigport::output::<i16>(&config).unwrap();
        assert_eq!(output.name(), "p");
        // 2 MiB * 0.9 * 8 bits / 12 bits per element
        assert_eq!(output.max_samples_per_push(), 1_258_290);
    }

    #[tokio::test]
    async fn factory_applies_routes() {
        let config = PortConfig { routes: vec![StreamRoute::new("tone", "conn-1")], ..PortConfig::named("out") };
        let output = Sigport::output::<f32>(&config).unwrap();
        assert_eq!(output.routes().await, config.routes);
    }

    #[test]
    fn factory_rejects_invalid_configuration() {
        let config = PortConfig { queue_threshold: 0, ..PortConfig::named("p") };
        assert!(matches!(Sigport::input::<u8>(&config), Err(PortError::Config { .. })));
        assert!(Sigport::output::<u8>(&PortConfig::default()).is_err());
    }
}
