//! Output port: fans packets out to connected transports

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::{MAX_TRANSFER_BYTES, Packet, StreamRoute, Transport, default_descriptor};
use crate::stats::{PortStatistics, SharedStatistics, UsesPortStatistics, WindowedStatistics};
use crate::types::{StreamDescriptor, TimeValue, sri};
use crate::{PortError, Result};

struct Connection<T> {
    id: String,
    transport: Arc<dyn Transport<T>>,
    statistics: SharedStatistics,
}

/// Descriptor published for a stream plus the connections that have seen it.
struct StreamState {
    sri: Arc<StreamDescriptor>,
    announced: HashSet<String>,
}

struct OutState<T> {
    connections: Vec<Connection<T>>,
    streams: HashMap<String, StreamState>,
    routes: Vec<StreamRoute>,
}

fn is_routed(routes: &[StreamRoute], stream_id: &str, connection_id: &str) -> bool {
    routes.is_empty() || routes.iter().any(|route| route.stream_id == stream_id && route.connection_id == connection_id)
}

/// Sending side of a port.
///
/// Pushes are serialized: a packet is delivered to every connection before the
/// next push starts.
pub struct OutPort<T> {
    name: String,
    bits_per_element: f64,
    max_samples_per_push: usize,
    statistics_enabled: bool,
    state: Mutex<OutState<T>>,
    registry: SyncMutex<Vec<(String, SharedStatistics)>>,
}

impl<T> std::fmt::Debug for OutPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutPort")
            .field("name", &self.name)
            .field("bits_per_element", &self.bits_per_element)
            .field("max_samples_per_push", &self.max_samples_per_push)
            .finish_non_exhaustive()
    }
}

impl<T> OutPort<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Output port sized for `T` with the default transfer ceiling.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limits(name, (std::mem::size_of::<T>() * 8) as f64, MAX_TRANSFER_BYTES)
    }

    pub fn with_limits(name: impl Into<String>, bits_per_element: f64, max_transfer_bytes: usize) -> Self {
        let bits_per_element = if bits_per_element > 0.0 { bits_per_element } else { 8.0 };
        Self {
            name: name.into(),
            bits_per_element,
            max_samples_per_push: max_samples_per_push(max_transfer_bytes, bits_per_element),
            statistics_enabled: true,
            state: Mutex::new(OutState { connections: Vec::new(), streams: HashMap::new(), routes: Vec::new() }),
            registry: SyncMutex::new(Vec::new()),
        }
    }

    /// Enable or disable statistics for existing and future connections.
    pub fn set_statistics_enabled(&mut self, enabled: bool) {
        self.statistics_enabled = enabled;
        for (_, statistics) in self.registry.get_mut().iter() {
            statistics.set_enabled(enabled);
        }
    }

    /// Restrict streams to the connections routed for them.
    pub fn with_routes(mut self, routes: impl IntoIterator<Item = StreamRoute>) -> Self {
        self.state.get_mut().routes = routes.into_iter().collect();
        self
    }

    /// Replace the routing rules. An empty set sends every stream everywhere.
    ///
    /// Streams already announced on a connection that loses its route receive no
    /// further packets there.
    pub async fn set_routes(&self, routes: impl IntoIterator<Item = StreamRoute>) {
        let routes: Vec<_> = routes.into_iter().collect();
        debug!(port = %self.name, count = routes.len(), "Stream routes updated");
        self.state.lock().await.routes = routes;
    }

    pub async fn routes(&self) -> Vec<StreamRoute> {
        self.state.lock().await.routes.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Largest number of elements sent in one packet.
    pub fn max_samples_per_push(&self) -> usize {
        self.max_samples_per_push
    }

    /// Add a connection. Active streams are announced on its first packet.
    pub async fn connect(&self, connection_id: impl Into<String>, transport: impl Transport<T>) -> Result<()> {
        let connection_id = connection_id.into();
        let mut state = self.state.lock().await;

        if state.connections.iter().any(|connection| connection.id == connection_id) {
            return Err(PortError::DuplicateConnection { connection_id });
        }

        let mut statistics = WindowedStatistics::sender(self.name.clone(), self.bits_per_element);
        statistics.set_enabled(self.statistics_enabled);
        let statistics = SharedStatistics::new(statistics);

        self.registry.lock().push((connection_id.clone(), statistics.clone()));
        state.connections.push(Connection {
            id: connection_id.clone(),
            transport: Arc::new(transport),
            statistics,
        });

        info!(port = %self.name, connection_id = %connection_id, "Connection added");
        Ok(())
    }

    /// Remove a connection, ending every stream it has seen with an empty
    /// end-of-stream packet.
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        let index = state
            .connections
            .iter()
            .position(|connection| connection.id == connection_id)
            .ok_or_else(|| PortError::unknown_connection(connection_id))?;
        let connection = state.connections.remove(index);
        self.registry.lock().retain(|(id, _)| id != connection_id);

        for (stream_id, stream) in state.streams.iter_mut() {
            if !stream.announced.remove(connection_id) {
                continue;
            }
            let packet = Packet::new(Vec::new(), TimeValue::not_set(), true, stream_id.clone());
            if let Err(e) = connection.transport.push_packet(packet).await {
                warn!(
                    port = %self.name,
                    connection_id,
                    stream_id = %stream_id,
                    "Failed to end stream on disconnect: {}",
                    e
                );
            }
        }

        info!(port = %self.name, connection_id, "Connection removed");
        Ok(())
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.connections.iter().map(|connection| connection.id.clone()).collect()
    }

    /// Descriptor currently published for `stream_id`.
    pub async fn stream(&self, stream_id: &str) -> Option<Arc<StreamDescriptor>> {
        let state = self.state.lock().await;
        state.streams.get(stream_id).map(|stream| stream.sri.clone())
    }

    pub async fn active_streams(&self) -> Vec<Arc<StreamDescriptor>> {
        let state = self.state.lock().await;
        state.streams.values().map(|stream| stream.sri.clone()).collect()
    }

    /// Publish a descriptor and forward it to every connection.
    ///
    /// A descriptor equal to the one already published is not forwarded again.
    /// Delivery failures are logged and the first one is returned after every
    /// connection has been tried.
    pub async fn push_sri(&self, descriptor: StreamDescriptor) -> Result<()> {
        let mut state = self.state.lock().await;
        let stream_id = descriptor.stream_id.clone();

        if let Some(existing) = state.streams.get(&stream_id) {
            let changes = sri::diff(Some(existing.sri.as_ref()), Some(&descriptor));
            if changes.is_empty() {
                trace!(port = %self.name, stream_id = %stream_id, "Descriptor unchanged");
                return Ok(());
            }
            debug!(port = %self.name, stream_id = %stream_id, changes = %changes, "Descriptor changed");
        } else {
            debug!(port = %self.name, stream_id = %stream_id, sample_rate = descriptor.sample_rate(), "New stream");
        }

        let descriptor = Arc::new(descriptor);
        let mut announced = HashSet::new();
        let mut first_error = None;

        for connection in &state.connections {
            if !is_routed(&state.routes, &stream_id, &connection.id) {
                continue;
            }
            match connection.transport.push_sri(&descriptor).await {
                Ok(()) => {
                    announced.insert(connection.id.clone());
                }
                Err(e) => {
                    error!(
                        port = %self.name,
                        connection_id = %connection.id,
                        stream_id = %stream_id,
                        "Descriptor push failed: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        state.streams.insert(stream_id, StreamState { sri: descriptor, announced });
        first_error.map_or(Ok(()), Err)
    }

    /// Send `data` on `stream_id`, splitting it into several packets when it
    /// exceeds the transfer ceiling.
    ///
    /// Split packets carry timestamps advanced by the samples already sent and
    /// only the last one carries `end_of_stream`. End of stream retires the
    /// stream's descriptor.
    pub async fn push_packet(
        &self,
        data: Vec<T>,
        time: TimeValue,
        end_of_stream: bool,
        stream_id: &str,
    ) -> Result<()> {
        if self.stream(stream_id).await.is_none() {
            warn!(port = %self.name, stream_id, "Packet for stream with no descriptor, using default");
            // Connections that missed the descriptor are retried below
            if let Err(e) = self.push_sri(default_descriptor(stream_id)).await {
                debug!(port = %self.name, stream_id, "Default descriptor not delivered everywhere: {}", e);
            }
        }

        let mut state = self.state.lock().await;
        let Some(descriptor) = state.streams.get(stream_id).map(|stream| stream.sri.clone()) else {
            return Err(PortError::unknown_stream(stream_id));
        };

        let result = if data.len() <= self.max_samples_per_push {
            self.deliver(&mut state, Packet::new(data, time, end_of_stream, stream_id)).await
        } else {
            self.deliver_chunked(&mut state, &descriptor, data, time, end_of_stream, stream_id)
                .await
        };

        if end_of_stream {
            state.streams.remove(stream_id);
            debug!(port = %self.name, stream_id, "Stream ended");
        }
        result
    }

    async fn deliver_chunked(
        &self,
        state: &mut OutState<T>,
        descriptor: &StreamDescriptor,
        data: Vec<T>,
        time: TimeValue,
        end_of_stream: bool,
        stream_id: &str,
    ) -> Result<()> {
        // Chunks hold whole frames so complex pairs and subsize rows stay intact
        let item_size = if descriptor.is_complex() { 2 } else { 1 };
        let frame_size = item_size * usize::try_from(descriptor.subsize).ok().filter(|&n| n > 0).unwrap_or(1);
        let chunk_size = (self.max_samples_per_push / frame_size).max(1) * frame_size;

        let count = data.len();
        let mut packet_time = time;
        let mut first_error = None;

        trace!(port = %self.name, stream_id, count, chunk_size, "Splitting oversized packet");

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let end = index * chunk_size + chunk.len();
            let packet_eos = end >= count && end_of_stream;

            let packet = Packet::new(chunk.to_vec(), packet_time, packet_eos, stream_id);
            if let Err(e) = self.deliver(state, packet).await {
                first_error.get_or_insert(e);
            }

            if packet_time.is_valid() {
                packet_time = packet_time.add_sample_offset(chunk.len() / item_size, descriptor.xdelta);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Deliver one packet to every connection, announcing the stream first where
    /// needed.
    async fn deliver(&self, state: &mut OutState<T>, packet: Packet<T>) -> Result<()> {
        let OutState { connections, streams, routes } = state;
        let Some(stream) = streams.get_mut(&packet.stream_id) else {
            return Err(PortError::unknown_stream(&packet.stream_id));
        };

        let elements = packet.data.len();
        let mut first_error = None;

        for connection in connections.iter() {
            if !is_routed(routes, &packet.stream_id, &connection.id) {
                continue;
            }
            let announced = stream.announced.contains(&connection.id);
            if !announced && elements == 0 {
                // Nothing was ever sent on this connection; an empty packet ends nothing
                continue;
            }

            if !announced {
                if let Err(e) = connection.transport.push_sri(&stream.sri).await {
                    error!(
                        port = %self.name,
                        connection_id = %connection.id,
                        stream_id = %packet.stream_id,
                        "Descriptor push failed: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                    continue;
                }
                stream.announced.insert(connection.id.clone());
            }

            let started = Instant::now();
            match connection.transport.push_packet(packet.clone()).await {
                Ok(()) => {
                    let delay = started.elapsed().as_secs_f64();
                    connection.statistics.record(1, elements as u64, 0.0, delay);
                }
                Err(e) => {
                    error!(
                        port = %self.name,
                        connection_id = %connection.id,
                        stream_id = %packet.stream_id,
                        "Packet push failed: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Per-connection statistics.
    pub fn statistics(&self) -> Vec<UsesPortStatistics> {
        self.registry
            .lock()
            .iter()
            .map(|(connection_id, statistics)| UsesPortStatistics {
                connection_id: connection_id.clone(),
                statistics: statistics.retrieve(),
            })
            .collect()
    }

    /// Statistics engine for one connection.
    pub fn connection_statistics(&self, connection_id: &str) -> Option<SharedStatistics> {
        self.registry
            .lock()
            .iter()
            .find(|(id, _)| id == connection_id)
            .map(|(_, statistics)| statistics.clone())
    }

    pub(crate) fn collect_statistics(&self) -> Vec<PortStatistics> {
        self.statistics().into_iter().map(|uses| uses.statistics).collect()
    }
}

fn max_samples_per_push(max_transfer_bytes: usize, bits_per_element: f64) -> usize {
    // Leave headroom under the ceiling for packet overhead
    let usable_bits = 8.0 * (max_transfer_bytes as f64 * 0.9).floor();
    ((usable_bits / bits_per_element) as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingTransport;
    use crate::types::TimeCodeMode;

    #[test]
    fn transfer_ceiling_in_elements() {
        assert_eq!(max_samples_per_push(MAX_TRANSFER_BYTES, 8.0), 1_887_436);
        assert_eq!(max_samples_per_push(1_000, 32.0), 225);
        assert_eq!(max_samples_per_push(0, 32.0), 1);
    }

    #[tokio::test]
    async fn duplicate_and_unknown_connections_are_rejected() {
        let port = OutPort::<i16>::new("out");
        port.connect("a", RecordingTransport::<i16>::new()).await.unwrap();

        let duplicate = port.connect("a", RecordingTransport::<i16>::new()).await;
        assert!(matches!(duplicate, Err(PortError::DuplicateConnection { .. })));

        let unknown = port.disconnect("b").await;
        assert!(matches!(unknown, Err(PortError::UnknownConnection { .. })));
    }

    #[tokio::test]
    async fn descriptor_announced_once_per_connection() {
        let port = OutPort::<i16>::new("out");
        let transport = RecordingTransport::<i16>::new();
        port.connect("a", transport.clone()).await.unwrap();

        let time = TimeValue::create(10.0, 0.0, TimeCodeMode::Cpu);
        port.push_sri(StreamDescriptor::create("s", 100.0, 1, false)).await.unwrap();
        port.push_packet(vec![1, 2, 3], time, false, "s").await.unwrap();
        port.push_packet(vec![4, 5, 6], time, false, "s").await.unwrap();
        assert_eq!(transport.descriptors().len(), 1);

        // Same descriptor again is not forwarded
        port.push_sri(StreamDescriptor::create("s", 100.0, 1, false)).await.unwrap();
        assert_eq!(transport.descriptors().len(), 1);

        port.push_sri(StreamDescriptor::create("s", 200.0, 1, false)).await.unwrap();
        assert_eq!(transport.descriptors().len(), 2);
        assert_eq!(transport.packets().len(), 2);
    }

    #[tokio::test]
    async fn late_connection_gets_descriptor_before_first_packet() {
        let port = OutPort::<i16>::new("out");
        port.push_sri(StreamDescriptor::create("s", 100.0, 1, false)).await.unwrap();

        let transport = RecordingTransport::<i16>::new();
        port.connect("late", transport.clone()).await.unwrap();
        assert!(transport.descriptors().is_empty());

        port.push_packet(vec![1], TimeValue::now(), false, "s").await.unwrap();
        assert_eq!(transport.descriptors().len(), 1);
        assert_eq!(transport.packets().len(), 1);
    }

    #[tokio::test]
    async fn oversized_packet_is_split_with_advancing_time() {
        // 100 bytes * 0.9 = 90 bytes = 90 elements of 8 bits
        let port = OutPort::<u8>::with_limits("out", 8.0, 100);
        let transport = RecordingTransport::<u8>::new();
        port.connect("a", transport.clone()).await.unwrap();
        port.push_sri(StreamDescriptor::create("s", 10.0, 1, false)).await.unwrap();

        let start = TimeValue::create(100.0, 0.0, TimeCodeMode::Cpu);
        port.push_packet(vec![0u8; 200], start, true, "s").await.unwrap();

        let packets = transport.packets();
        let sizes: Vec<_> = packets.iter().map(|packet| packet.data.len()).collect();
        assert_eq!(sizes, [90, 90, 20]);

        let eos: Vec<_> = packets.iter().map(|packet| packet.end_of_stream).collect();
        assert_eq!(eos, [false, false, true]);

        // xdelta 0.1s per sample
        assert_eq!(packets[1].time.difference(&start), 9.0);
        assert_eq!(packets[2].time.difference(&start), 18.0);

        assert!(port.stream("s").await.is_none());
    }

    #[tokio::test]
    async fn complex_chunks_hold_whole_pairs() {
        let port = OutPort::<u8>::with_limits("out", 8.0, 100);
        let transport = RecordingTransport::<u8>::new();
        port.connect("a", transport.clone()).await.unwrap();
        port.push_sri(StreamDescriptor::create("iq", 1.0, 1, false).with_subsize(3).with_mode(true))
            .await
            .unwrap();

        let start = TimeValue::create(0.0, 0.0, TimeCodeMode::Cpu);
        port.push_packet(vec![0u8; 100], start, false, "iq").await.unwrap();

        let packets = transport.packets();
        let sizes: Vec<_> = packets.iter().map(|packet| packet.data.len()).collect();
        // Frames of 2 * 3 scalars: 90 / 6 = 15 frames per chunk
        assert_eq!(sizes, [90, 10]);
        // 90 scalars are 45 complex samples at 1 s each
        assert_eq!(packets[1].time.difference(&start), 45.0);
    }

    #[tokio::test]
    async fn unknown_stream_gets_default_descriptor() {
        let port = OutPort::<f32>::new("out");
        let transport = RecordingTransport::<f32>::new();
        port.connect("a", transport.clone()).await.unwrap();

        port.push_packet(vec![1.0], TimeValue::now(), false, "anon").await.unwrap();

        let descriptors = transport.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].stream_id, "anon");
        assert_eq!(descriptors[0].xdelta, 1.0);
    }

    #[tokio::test]
    async fn statistics_per_connection() {
        let port = OutPort::<f32>::new("out");
        port.connect("a", RecordingTransport::<f32>::new()).await.unwrap();
        port.connect("b", RecordingTransport::<f32>::new()).await.unwrap();
        port.push_packet(vec![1.0; 16], TimeValue::now(), false, "s").await.unwrap();

        let statistics = port.statistics();
        let ids: Vec<_> = statistics.iter().map(|uses| uses.connection_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(statistics[0].statistics.port_name, "out");

        let engine = port.connection_statistics("a").unwrap();
        engine.with(|stats| {
            assert_eq!(stats.total_calls(), 1);
            assert_eq!(stats.bits_per_element(), 32.0);
        });
    }

    #[tokio::test]
    async fn failing_connection_does_not_block_others() {
        let port = OutPort::<i32>::new("out");
        let broken = RecordingTransport::<i32>::failing();
        let healthy = RecordingTransport::<i32>::new();
        port.connect("broken", broken).await.unwrap();
        port.connect("healthy", healthy.clone()).await.unwrap();

        let result = port.push_packet(vec![7], TimeValue::now(), false, "s").await;
        assert!(matches!(result, Err(PortError::Transport { .. })));
        assert_eq!(healthy.packets().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_ends_streams_on_that_connection() {
        let port = OutPort::<i32>::new("out");
        let transport = RecordingTransport::<i32>::new();
        port.connect("a", transport.clone()).await.unwrap();
        port.push_packet(vec![1, 2], TimeValue::now(), false, "s").await.unwrap();

        port.disconnect("a").await.unwrap();

        let packets = transport.packets();
        assert_eq!(packets.len(), 2);
        assert!(packets[1].end_of_stream);
        assert!(packets[1].data.is_empty());
        assert!(port.connection_ids().await.is_empty());
        assert!(port.statistics().is_empty());
    }

    #[derive(Clone)]
    struct SlowTransport {
        inner: RecordingTransport<i32>,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl Transport<i32> for SlowTransport {
        async fn push_sri(&self, descriptor: &StreamDescriptor) -> Result<()> {
            self.inner.push_sri(descriptor).await
        }

        async fn push_packet(&self, packet: Packet<i32>) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.push_packet(packet).await
        }
    }

    #[tokio::test]
    async fn slow_transport_shows_up_as_latency() {
        let port = OutPort::<i32>::new("out");
        let slow = SlowTransport { inner: RecordingTransport::new(), delay: std::time::Duration::from_millis(20) };
        port.connect("slow", slow.clone()).await.unwrap();
        port.push_packet(vec![1, 2, 3], TimeValue::now(), false, "s").await.unwrap();

        let record = &port.statistics()[0].statistics;
        let latency = record.keyword(crate::stats::AVERAGE_LATENCY).and_then(crate::types::Value::as_f64);
        assert!(latency.is_some_and(|seconds| seconds >= 0.019), "latency was {latency:?}");
        assert_eq!(slow.inner.packet_count(), 1);
    }

    #[tokio::test]
    async fn routes_limit_streams_to_their_connections() {
        let a = RecordingTransport::<i32>::new();
        let b = RecordingTransport::<i32>::new();
        let port = OutPort::<i32>::new("out").with_routes([StreamRoute::new("left", "a"), StreamRoute::new("right", "b")]);
        port.connect("a", a.clone()).await.unwrap();
        port.connect("b", b.clone()).await.unwrap();

        port.push_sri(StreamDescriptor::create("left", 10.0, 1, false)).await.unwrap();
        port.push_packet(vec![1], TimeValue::now(), false, "left").await.unwrap();
        port.push_packet(vec![2], TimeValue::now(), false, "right").await.unwrap();
        port.push_packet(vec![3], TimeValue::now(), false, "unrouted").await.unwrap();

        let streams = |transport: &RecordingTransport<i32>| -> Vec<String> {
            transport.packets().into_iter().map(|packet| packet.stream_id).collect()
        };
        assert_eq!(streams(&a), ["left"]);
        assert_eq!(streams(&b), ["right"]);
        assert_eq!(a.descriptors().len(), 1);
        assert_eq!(b.descriptors().len(), 1);
    }

    #[tokio::test]
    async fn clearing_routes_restores_fan_out() {
        let a = RecordingTransport::<i32>::new();
        let b = RecordingTransport::<i32>::new();
        let port = OutPort::<i32>::new("out");
        port.connect("a", a.clone()).await.unwrap();
        port.connect("b", b.clone()).await.unwrap();

        port.set_routes([StreamRoute::new("s", "a")]).await;
        port.push_packet(vec![1], TimeValue::now(), false, "s").await.unwrap();
        assert_eq!((a.packet_count(), b.packet_count()), (1, 0));

        port.set_routes(Vec::new()).await;
        assert!(port.routes().await.is_empty());
        port.push_packet(vec![2], TimeValue::now(), false, "s").await.unwrap();
        assert_eq!((a.packet_count(), b.packet_count()), (2, 1));
        // The newly reached connection is announced before its first packet
        assert_eq!(b.descriptors().len(), 1);
    }
}
