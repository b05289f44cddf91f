//! In-process ports that move sample data between pipeline stages.
//!
//! An [`OutPort`] fans packets out to any number of connections. Each connection
//! is a [`Transport`]; an [`InPort`] is the in-process transport that queues
//! packets for a consumer. Before a connection sees its first packet on a stream
//! it receives that stream's descriptor, and every transfer is recorded in the
//! port's statistics.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sigport::port::{InPort, OutPort};
//! use sigport::types::{StreamDescriptor, TimeValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sigport::Result<()> {
//! let output = OutPort::<f32>::new("dataFloat_out");
//! let input = Arc::new(InPort::<f32>::new("dataFloat_in"));
//! output.connect("conn-1", input.clone()).await?;
//!
//! output.push_sri(StreamDescriptor::create("tone", 48_000.0, 1, false)).await?;
//! output.push_packet(vec![0.0, 0.5, 1.0], TimeValue::now(), false, "tone").await?;
//!
//! let transfer = input.get_packet(Duration::from_millis(100)).await?;
//! assert_eq!(transfer.data.len(), 3);
//! assert!(transfer.sri_changed);
//! # Ok(())
//! # }
//! ```

mod input;
mod output;
mod poller;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use input::InPort;
pub use output::OutPort;
pub use poller::{PollerChannels, StatisticsPoller, StatisticsSource};

use crate::Result;
use crate::types::{StreamDescriptor, TimeValue};

/// Transfer ceiling for a single push, in bytes.
pub const MAX_TRANSFER_BYTES: usize = 2 * 1024 * 1024;

/// Input queue depth used when none is configured.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 100;

/// One transfer of sample data on a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<T> {
    pub data: Vec<T>,
    /// Time of the first sample
    pub time: TimeValue,
    pub end_of_stream: bool,
    pub stream_id: String,
}

impl<T> Packet<T> {
    pub fn new(data: Vec<T>, time: TimeValue, end_of_stream: bool, stream_id: impl Into<String>) -> Self {
        Self { data, time, end_of_stream, stream_id: stream_id.into() }
    }
}

/// Rule sending one stream to one connection.
///
/// Once a port has any route, a stream reaches only the connections routed for
/// it. A port without routes sends every stream everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StreamRoute {
    pub stream_id: String,
    pub connection_id: String,
}

impl StreamRoute {
    pub fn new(stream_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self { stream_id: stream_id.into(), connection_id: connection_id.into() }
    }
}

/// A packet as delivered to the consumer of an [`InPort`].
#[derive(Debug, Clone)]
pub struct DataTransfer<T> {
    pub data: Vec<T>,
    pub time: TimeValue,
    pub end_of_stream: bool,
    pub stream_id: String,
    /// Descriptor in effect when the packet was queued
    pub sri: Arc<StreamDescriptor>,
    /// The descriptor changed since the previous packet on this stream
    pub sri_changed: bool,
    /// Packets were discarded ahead of this one
    pub input_queue_flushed: bool,
}

/// Receiving end of a connection.
///
/// Implementations must tolerate a descriptor being pushed more than once and
/// packets arriving for streams they have no descriptor for.
#[async_trait::async_trait]
pub trait Transport<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Deliver a new or updated stream descriptor.
    async fn push_sri(&self, descriptor: &StreamDescriptor) -> Result<()>;

    /// Deliver one packet.
    async fn push_packet(&self, packet: Packet<T>) -> Result<()>;
}

#[async_trait::async_trait]
impl<T, P> Transport<T> for Arc<P>
where
    T: Send + 'static,
    P: Transport<T> + ?Sized,
{
    async fn push_sri(&self, descriptor: &StreamDescriptor) -> Result<()> {
        self.as_ref().push_sri(descriptor).await
    }

    async fn push_packet(&self, packet: Packet<T>) -> Result<()> {
        self.as_ref().push_packet(packet).await
    }
}

/// Descriptor a port assumes for a stream it never received one for.
pub(crate) fn default_descriptor(stream_id: &str) -> StreamDescriptor {
    StreamDescriptor::create(stream_id, 0.0, crate::types::UNITS_TIME, false)
}
