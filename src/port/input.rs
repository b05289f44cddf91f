//! Input port: queues packets for a consumer

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, trace, warn};

use super::{DEFAULT_QUEUE_THRESHOLD, DataTransfer, Packet, Transport, default_descriptor};
use crate::stats::{PortStatistics, SharedStatistics, WindowedStatistics};
use crate::stream::DistinctSriExt;
use crate::types::{SriComparator, StreamDescriptor, sri};
use crate::{PortError, Result};

/// Descriptor known for a stream and whether the consumer has seen it yet.
struct StreamEntry {
    sri: Arc<StreamDescriptor>,
    changed: bool,
}

struct InState<T> {
    queue: VecDeque<DataTransfer<T>>,
    streams: HashMap<String, StreamEntry>,
    threshold: usize,
    /// Blocking requested through configuration
    blocking: bool,
    /// Blocking latched by a descriptor; released at end of stream
    sri_blocking: bool,
    closed: bool,
}

impl<T> InState<T> {
    fn is_blocking(&self) -> bool {
        self.blocking || self.sri_blocking
    }

    /// Remove the first packet, or the first one for `stream_id`.
    fn take(&mut self, stream_id: Option<&str>) -> Option<DataTransfer<T>> {
        let index = match stream_id {
            None => 0,
            Some(id) => self.queue.iter().position(|packet| packet.stream_id == id)?,
        };
        let packet = self.queue.remove(index)?;

        if packet.end_of_stream && self.sri_blocking && !self.streams.values().any(|entry| entry.sri.blocking) {
            self.sri_blocking = false;
        }
        Some(packet)
    }
}

/// Receiving side of a port.
///
/// When the queue reaches its threshold a non-blocking port discards every
/// queued data packet (end-of-stream markers survive with their data emptied)
/// and flags the next delivered packet. A blocking port makes the sender wait
/// for room instead. Any descriptor with `blocking` set switches the port to
/// blocking mode until an end-of-stream packet is taken while no open stream is
/// blocking.
pub struct InPort<T> {
    name: String,
    state: Mutex<InState<T>>,
    data_available: Notify,
    queue_available: Notify,
    statistics: SharedStatistics,
    comparator: SriComparator,
    sri_updates: watch::Sender<Option<Arc<StreamDescriptor>>>,
}

impl<T> std::fmt::Debug for InPort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InPort").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T> InPort<T>
where
    T: Send + 'static,
{
    /// Input port sized for `T` with the default queue threshold.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_statistics(name, (std::mem::size_of::<T>() * 8) as f64)
    }

    pub fn with_statistics(name: impl Into<String>, bits_per_element: f64) -> Self {
        let name = name.into();
        let (sri_updates, _) = watch::channel(None);
        Self {
            statistics: SharedStatistics::new(WindowedStatistics::receiver(name.clone(), bits_per_element)),
            name,
            state: Mutex::new(InState {
                queue: VecDeque::new(),
                streams: HashMap::new(),
                threshold: DEFAULT_QUEUE_THRESHOLD,
                blocking: false,
                sri_blocking: false,
                closed: false,
            }),
            data_available: Notify::new(),
            queue_available: Notify::new(),
            comparator: sri::equals,
            sri_updates,
        }
    }

    /// Replace the comparator deciding whether a pushed descriptor is a change.
    pub fn with_comparator(mut self, comparator: SriComparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_threshold(&self) -> usize {
        self.state.lock().threshold
    }

    pub fn set_queue_threshold(&self, threshold: usize) -> Result<()> {
        if threshold == 0 {
            return Err(PortError::invalid_config(
                "queue_threshold",
                "Queue threshold must be at least 1",
            ));
        }
        self.state.lock().threshold = threshold;
        self.queue_available.notify_waiters();
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_blocking(&self) -> bool {
        self.state.lock().is_blocking()
    }

    /// Force blocking mode regardless of descriptors.
    pub fn set_blocking(&self, blocking: bool) {
        self.state.lock().blocking = blocking;
        self.queue_available.notify_waiters();
    }

    /// Descriptors for streams that have not ended.
    pub fn active_sris(&self) -> Vec<Arc<StreamDescriptor>> {
        self.state.lock().streams.values().map(|entry| entry.sri.clone()).collect()
    }

    pub fn statistics(&self) -> PortStatistics {
        self.statistics.retrieve()
    }

    pub fn set_statistics_enabled(&self, enabled: bool) {
        self.statistics.set_enabled(enabled);
    }

    /// Statistics engine shared with this port.
    pub fn statistics_handle(&self) -> SharedStatistics {
        self.statistics.clone()
    }

    /// New and changed descriptors, starting with the latest one known.
    pub fn sri_updates(&self) -> impl Stream<Item = Arc<StreamDescriptor>> + Send + use<T> {
        WatchStream::new(self.sri_updates.subscribe())
            .filter_map(futures::future::ready)
            .distinct_sri_by(self.comparator)
    }

    /// Accept a descriptor for a stream.
    ///
    /// Returns whether it was new or differed from the known one.
    pub fn accept_sri(&self, descriptor: &StreamDescriptor) -> bool {
        let mut state = self.state.lock();

        if descriptor.blocking && !state.sri_blocking {
            debug!(port = %self.name, stream_id = %descriptor.stream_id, "Blocking descriptor, port now blocking");
            state.sri_blocking = true;
        }

        let changed = match state.streams.get(&descriptor.stream_id) {
            None => {
                debug!(
                    port = %self.name,
                    stream_id = %descriptor.stream_id,
                    sample_rate = descriptor.sample_rate(),
                    "New stream"
                );
                true
            }
            Some(entry) if !(self.comparator)(Some(entry.sri.as_ref()), Some(descriptor)) => {
                debug!(
                    port = %self.name,
                    stream_id = %descriptor.stream_id,
                    changes = %sri::diff(Some(entry.sri.as_ref()), Some(descriptor)),
                    "Descriptor changed"
                );
                true
            }
            Some(_) => false,
        };

        if changed {
            let published = Arc::new(descriptor.clone());
            state
                .streams
                .insert(descriptor.stream_id.clone(), StreamEntry { sri: published.clone(), changed: true });
            self.sri_updates.send_replace(Some(published));
        }
        changed
    }

    /// Queue a packet, waiting for room when the port is blocking.
    ///
    /// Time spent waiting is recorded as the transfer's delay.
    pub async fn accept_packet(&self, packet: Packet<T>) -> Result<()> {
        if packet.data.is_empty() && !packet.end_of_stream {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            let room = self.queue_available.notified();
            {
                let state = self.state.lock();
                if state.closed {
                    return Err(PortError::closed(&self.name));
                }
                if !state.is_blocking() || state.queue.len() < state.threshold {
                    break;
                }
            }
            trace!(port = %self.name, "Queue full, waiting for room");
            room.await;
        }

        self.enqueue(packet, started.elapsed().as_secs_f64())
    }

    fn enqueue(&self, packet: Packet<T>, delay: f64) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::closed(&self.name));
        }

        let Packet { data, time, end_of_stream, stream_id } = packet;

        if !state.streams.contains_key(&stream_id) {
            warn!(port = %self.name, stream_id = %stream_id, "Packet for stream with no descriptor, using default");
            let published = Arc::new(default_descriptor(&stream_id));
            state
                .streams
                .insert(stream_id.clone(), StreamEntry { sri: published.clone(), changed: true });
            self.sri_updates.send_replace(Some(published));
        }

        let mut flushed = None;
        if !state.is_blocking() && state.queue.len() >= state.threshold {
            flushed = Some(flush_queue(&mut *state));
        }

        let Some(entry) = state.streams.get_mut(&stream_id) else {
            return Err(PortError::unknown_stream(stream_id));
        };
        let sri = entry.sri.clone();
        let sri_changed = std::mem::replace(&mut entry.changed, false);

        let depth = state.queue.len() as f32 / state.threshold as f32;
        self.statistics.record(1, data.len() as u64, depth, delay);
        if let Some(dropped) = flushed {
            warn!(port = %self.name, dropped, "Input queue full, flushed");
            self.statistics.flush_occurred(dropped);
        }

        state.queue.push_back(DataTransfer {
            data,
            time,
            end_of_stream,
            stream_id: stream_id.clone(),
            sri,
            sri_changed,
            input_queue_flushed: false,
        });

        if end_of_stream {
            state.streams.remove(&stream_id);
        }

        // The first packet out after a flush carries the flag
        if flushed.is_some() {
            if let Some(front) = state.queue.front_mut() {
                front.input_queue_flushed = true;
            }
        }

        drop(state);
        // Consumers may be waiting on different streams
        self.data_available.notify_waiters();
        Ok(())
    }

    fn take(&self, stream_id: Option<&str>) -> Option<DataTransfer<T>> {
        let mut state = self.state.lock();
        let was_blocking = state.sri_blocking;
        let packet = state.take(stream_id)?;
        let released = was_blocking && !state.sri_blocking;
        drop(state);

        if released {
            debug!(port = %self.name, stream_id = %packet.stream_id, "Blocking streams ended, port no longer blocking");
            self.queue_available.notify_waiters();
        } else {
            self.queue_available.notify_one();
        }
        Some(packet)
    }

    /// Take the next packet if one is queued.
    pub fn try_get_packet(&self) -> Option<DataTransfer<T>> {
        self.take(None)
    }

    /// Take the oldest packet queued for `stream_id`, leaving other streams queued.
    pub fn try_get_packet_for(&self, stream_id: &str) -> Option<DataTransfer<T>> {
        self.take(Some(stream_id))
    }

    /// Wait for the next packet.
    ///
    /// Fails with [`PortError::Closed`] once the port is closed and drained.
    pub async fn next_packet(&self) -> Result<DataTransfer<T>> {
        self.wait_for(None).await
    }

    /// Wait for the next packet on `stream_id`.
    pub async fn next_packet_for(&self, stream_id: &str) -> Result<DataTransfer<T>> {
        self.wait_for(Some(stream_id)).await
    }

    async fn wait_for(&self, stream_id: Option<&str>) -> Result<DataTransfer<T>> {
        loop {
            let available = self.data_available.notified();
            if let Some(packet) = self.take(stream_id) {
                return Ok(packet);
            }
            if self.is_closed() {
                // A packet may have landed just before the close
                return self.take(stream_id).ok_or_else(|| PortError::closed(&self.name));
            }
            available.await;
        }
    }

    /// Wait up to `timeout` for the next packet.
    pub async fn get_packet(&self, timeout: Duration) -> Result<DataTransfer<T>> {
        tokio::time::timeout(timeout, self.next_packet())
            .await
            .map_err(|_| PortError::Timeout { duration: timeout })?
    }

    /// Wait up to `timeout` for the next packet on `stream_id`.
    pub async fn get_packet_for(&self, stream_id: &str, timeout: Duration) -> Result<DataTransfer<T>> {
        tokio::time::timeout(timeout, self.next_packet_for(stream_id))
            .await
            .map_err(|_| PortError::Timeout { duration: timeout })?
    }

    /// Refuse further packets and wake every waiter. Queued packets can still be
    /// taken.
    pub fn close(&self) {
        self.state.lock().closed = true;
        debug!(port = %self.name, "Port closed");
        self.data_available.notify_waiters();
        self.queue_available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Drop queued data packets and return how many were discarded.
///
/// End-of-stream packets survive with their data emptied. A descriptor change
/// carried by a discarded packet moves to that stream's end-of-stream packet, or
/// to the stream's next packet when the stream is still open.
fn flush_queue<T>(state: &mut InState<T>) -> u64 {
    let mut pending_changes: Vec<String> = Vec::new();
    let mut kept = VecDeque::new();
    let mut dropped = 0u64;

    for mut packet in state.queue.drain(..) {
        if packet.end_of_stream {
            if let Some(position) = pending_changes.iter().position(|id| *id == packet.stream_id) {
                pending_changes.swap_remove(position);
                packet.sri_changed = true;
            }
            packet.data.clear();
            packet.input_queue_flushed = false;
            kept.push_back(packet);
        } else {
            if packet.sri_changed && !pending_changes.contains(&packet.stream_id) {
                pending_changes.push(packet.stream_id.clone());
            }
            dropped += 1;
        }
    }
    state.queue = kept;

    for stream_id in pending_changes {
        if let Some(entry) = state.streams.get_mut(&stream_id) {
            entry.changed = true;
        }
    }
    dropped
}

#[async_trait::async_trait]
impl<T> Transport<T> for InPort<T>
where
    T: Send + 'static,
{
    async fn push_sri(&self, descriptor: &StreamDescriptor) -> Result<()> {
        if self.is_closed() {
            return Err(PortError::closed(&self.name));
        }
        self.accept_sri(descriptor);
        Ok(())
    }

    async fn push_packet(&self, packet: Packet<T>) -> Result<()> {
        self.accept_packet(packet).await
    }
}
