//! Bounded input queue with signal-preserving overflow.
//!
//! # Overflow
//!
//! When a push finds the queue full and no stream has asked for blocking
//! delivery, the queue is purged:
//! - EOS envelopes survive with their payload emptied
//! - every other envelope is dropped
//! - a dropped SRI change moves onto the same stream's surviving EOS, or back
//!   into the stream's pending flag so the next packet for that stream
//!   reports it
//! - the first envelope left in the queue is marked `queue_flushed`
//!
//! When any descriptor is blocking, producers wait on `queue_available`
//! instead. A stop while waiting discards the packet.

use super::packet::PacketEnvelope;
use crate::config::StreamConfig;
use crate::error::Result;
use crate::port::{Port, PortDirection, PortUsage};
use crate::sri::StreamSri;
use crate::stats::{PortStatistics, StatisticsRecorder};
use crate::transport::StreamTransport;
use crate::types::{wait_while, StreamElement, Timeout, Timestamp};
use parking_lot::{Condvar, Mutex};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Queue depth that never fills
pub const UNLIMITED_QUEUE_DEPTH: usize = usize::MAX;

/// Default queue depth in packets
pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Callback invoked with a descriptor, outside the queue lock
pub type SriListener = Arc<dyn Fn(&StreamSri) + Send + Sync>;

#[derive(Debug)]
struct SriEntry {
    sri: StreamSri,
    /// Set until a queued packet carries this descriptor
    changed: bool,
}

struct QueueState<T> {
    packets: VecDeque<PacketEnvelope<T>>,
    max_depth: usize,
    sris: HashMap<String, SriEntry>,
    blocking: bool,
    started: bool,
    stats: StatisticsRecorder,
}

impl<T> QueueState<T> {
    fn is_full(&self) -> bool {
        self.packets.len() >= self.max_depth
    }

    fn depth_ratio(&self) -> f64 {
        if self.max_depth == UNLIMITED_QUEUE_DEPTH || self.max_depth == 0 {
            0.0
        } else {
            self.packets.len() as f64 / self.max_depth as f64
        }
    }

    fn find(&self, stream_id: Option<&str>) -> Option<usize> {
        match stream_id {
            None if self.packets.is_empty() => None,
            None => Some(0),
            Some(id) => self.packets.iter().position(|p| p.stream_id() == id),
        }
    }

    fn any_blocking(&self) -> bool {
        self.sris.values().any(|entry| entry.sri.blocking)
    }

    /// Drop everything but EOS envelopes, keeping SRI-change signals alive.
    fn purge(&mut self) {
        let mut changed: HashSet<String> = HashSet::new();
        let mut saved = VecDeque::new();

        for mut packet in std::mem::take(&mut self.packets) {
            if packet.eos {
                // A later change belongs to a new stream with the same id
                if changed.remove(packet.stream_id()) {
                    packet.sri_changed = true;
                }
                packet.data.clear();
                packet.queue_flushed = false;
                saved.push_back(packet);
            } else if packet.sri_changed {
                changed.insert(packet.stream_id().to_string());
            }
        }

        self.packets = saved;

        for stream_id in changed {
            if let Some(entry) = self.sris.get_mut(&stream_id) {
                entry.changed = true;
            }
        }
        self.stats.record_flush();
    }
}

#[derive(Default)]
struct Listeners {
    new_sri: Option<SriListener>,
    sri_change: Option<SriListener>,
}

/// Consumer-side packet queue for one input port.
pub struct BoundedInputQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    data_available: Condvar,
    queue_available: Condvar,
    listeners: Mutex<Listeners>,
    _element: PhantomData<fn() -> T>,
}

impl<T: StreamElement> BoundedInputQueue<T> {
    pub fn new(name: impl Into<String>, max_depth: usize) -> Self {
        let name = name.into();
        let stats = StatisticsRecorder::new(name.clone(), T::BITS);
        Self::build(name, max_depth, stats)
    }

    pub fn with_config(name: impl Into<String>, config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let stats = config.statistics.recorder(&name, T::BITS);
        Ok(Self::build(name, config.input.queue_depth(), stats))
    }

    fn build(name: String, max_depth: usize, stats: StatisticsRecorder) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                max_depth,
                sris: HashMap::new(),
                blocking: false,
                started: true,
                stats,
            }),
            data_available: Condvar::new(),
            queue_available: Condvar::new(),
            listeners: Mutex::new(Listeners::default()),
            _element: PhantomData,
        }
    }

    /// Called with the first descriptor seen for each stream
    pub fn set_new_sri_listener<F>(&self, listener: F)
    where
        F: Fn(&StreamSri) + Send + Sync + 'static,
    {
        self.listeners.lock().new_sri = Some(Arc::new(listener));
    }

    /// Called when a known stream's descriptor changes
    pub fn set_sri_change_listener<F>(&self, listener: F)
    where
        F: Fn(&StreamSri) + Send + Sync + 'static,
    {
        self.listeners.lock().sri_change = Some(Arc::new(listener));
    }

    pub fn max_depth(&self) -> usize {
        self.state.lock().max_depth
    }

    /// Change the depth limit. `UNLIMITED_QUEUE_DEPTH` disables it, 0 makes
    /// the queue discard every packet.
    pub fn set_max_depth(&self, max_depth: usize) {
        let mut state = self.state.lock();
        let raised = max_depth > state.max_depth;
        state.max_depth = max_depth;
        if raised {
            self.queue_available.notify_all();
        }
    }

    pub fn depth(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Latest descriptor of every stream that has not ended
    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.state
            .lock()
            .sris
            .values()
            .map(|entry| entry.sri.clone())
            .collect()
    }

    /// Enable or disable statistics collection
    pub fn enable_stats(&self, enabled: bool) {
        self.state.lock().stats.set_enabled(enabled);
    }

    /// Next envelope from any stream.
    ///
    /// Returns `None` on timeout or when the queue is stopped.
    pub fn pop(&self, timeout: Timeout) -> Option<PacketEnvelope<T>> {
        self.next_packet(timeout, None)
    }

    /// Next envelope for `stream_id`. A stream with nothing queued is simply
    /// not ready yet.
    pub fn pop_stream(&self, timeout: Timeout, stream_id: &str) -> Option<PacketEnvelope<T>> {
        self.next_packet(timeout, Some(stream_id))
    }

    fn next_packet(&self, timeout: Timeout, stream_id: Option<&str>) -> Option<PacketEnvelope<T>> {
        let mut state = self.state.lock();
        if !state.started {
            return None;
        }

        wait_while(&self.data_available, &mut state, timeout, |s| {
            s.started && s.find(stream_id).is_none()
        });
        if !state.started {
            return None;
        }

        let index = state.find(stream_id)?;
        let packet = state.packets.remove(index)?;
        tracing::trace!(
            "Port '{}' popped packet for '{}' (queue={})",
            self.name,
            packet.stream_id(),
            state.packets.len()
        );
        self.queue_available.notify_all();

        if packet.eos && state.blocking && !state.any_blocking() {
            tracing::debug!("Port '{}' leaving blocking mode", self.name);
            state.blocking = false;
        }
        Some(packet)
    }

    /// Consumer-initiated purge, same signal preservation as an overflow.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        tracing::debug!(
            "Port '{}' flushing input queue (size={})",
            self.name,
            state.packets.len()
        );
        state.purge();
        if let Some(first) = state.packets.front_mut() {
            first.queue_flushed = true;
        }
        self.queue_available.notify_all();
    }

    fn notify(listener: Option<SriListener>, sri: &StreamSri) {
        if let Some(listener) = listener {
            listener(sri);
        }
    }
}

impl<T: StreamElement> StreamTransport<T> for BoundedInputQueue<T> {
    fn push_sri(&self, sri: &StreamSri) -> Result<()> {
        let (is_new, is_changed) = {
            let mut state = self.state.lock();
            if sri.blocking {
                state.blocking = true;
            }
            match state.sris.get_mut(&sri.stream_id) {
                None => {
                    tracing::debug!("Port '{}' new SRI for '{}'", self.name, sri.stream_id);
                    state.sris.insert(
                        sri.stream_id.clone(),
                        SriEntry {
                            sri: sri.clone(),
                            changed: true,
                        },
                    );
                    (true, false)
                }
                Some(entry) if !StreamSri::compare(&entry.sri, sri) => {
                    tracing::debug!("Port '{}' SRI changed for '{}'", self.name, sri.stream_id);
                    entry.sri = sri.clone();
                    entry.changed = true;
                    (false, true)
                }
                Some(_) => (false, false),
            }
        };

        if is_new {
            let listener = self.listeners.lock().new_sri.clone();
            Self::notify(listener, sri);
        } else if is_changed {
            let listener = self.listeners.lock().sri_change.clone();
            Self::notify(listener, sri);
        }
        Ok(())
    }

    fn push_packet(&self, data: &[T], time: Timestamp, eos: bool, stream_id: &str) -> Result<()> {
        let started_at = Instant::now();

        // No data and no EOS: nothing a consumer could use
        if data.is_empty() && !eos {
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.max_depth == 0 {
            return Ok(());
        }

        // Unknown streams get a default descriptor. Nothing bounds how many
        // ids a peer can introduce this way.
        let mut created = None;
        let entry = match state.sris.entry(stream_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::warn!(
                    "Port '{}' received data for stream '{}' with no SRI",
                    self.name,
                    stream_id
                );
                let sri = StreamSri::new(stream_id);
                created = Some(sri.clone());
                entry.insert(SriEntry { sri, changed: true })
            }
        };
        let sri = entry.sri.clone();
        let mut sri_changed = std::mem::take(&mut entry.changed);
        let mut flushed = false;

        if state.blocking {
            wait_while(&self.queue_available, &mut state, Timeout::Blocking, |s| {
                s.started && s.is_full()
            });
            if !state.started {
                tracing::debug!(
                    "Port '{}' stopped while blocked, discarding packet for '{}'",
                    self.name,
                    stream_id
                );
                if sri_changed {
                    if let Some(entry) = state.sris.get_mut(stream_id) {
                        entry.changed = true;
                    }
                }
                drop(state);
                if let Some(sri) = created {
                    let listener = self.listeners.lock().new_sri.clone();
                    Self::notify(listener, &sri);
                }
                return Ok(());
            }
        } else if state.is_full() {
            tracing::debug!(
                "Port '{}' purging input queue (size={})",
                self.name,
                state.packets.len()
            );
            state.purge();
            flushed = true;
            if let Some(entry) = state.sris.get_mut(stream_id) {
                sri_changed |= std::mem::take(&mut entry.changed);
            }
        }

        let depth_ratio = state.depth_ratio();
        state.packets.push_back(PacketEnvelope {
            data: data.to_vec(),
            time,
            eos,
            sri,
            sri_changed,
            queue_flushed: false,
        });
        if eos {
            state.sris.remove(stream_id);
        }
        if flushed {
            if let Some(first) = state.packets.front_mut() {
                first.queue_flushed = true;
            }
        }
        tracing::trace!(
            "Port '{}' queued packet for '{}' (queue={})",
            self.name,
            stream_id,
            state.packets.len()
        );
        state
            .stats
            .record(data.len(), 0, depth_ratio, started_at.elapsed());
        self.data_available.notify_all();
        drop(state);

        if let Some(sri) = created {
            let listener = self.listeners.lock().new_sri.clone();
            Self::notify(listener, &sri);
        }
        Ok(())
    }
}

impl<T: StreamElement> Port for BoundedInputQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> PortDirection {
        PortDirection::Input
    }

    fn state(&self) -> PortUsage {
        let state = self.state.lock();
        PortUsage::from_depth(state.packets.len(), state.max_depth)
    }

    fn start(&self) {
        self.state.lock().started = true;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.started = false;
        self.data_available.notify_all();
        self.queue_available.notify_all();
    }

    fn statistics(&self) -> PortStatistics {
        let state = self.state.lock();
        let mut stream_ids: Vec<String> = state.sris.keys().cloned().collect();
        stream_ids.sort();
        state.stats.snapshot(stream_ids)
    }
}
