//! Output port fan-out.
//!
//! An [`OutPort`] forwards descriptor and packet pushes to every connected
//! transport. Each stream remembers which connections have already seen its
//! current descriptor, so a connection made mid-stream still receives the
//! descriptor before its first packet.

use super::{BufferedOutputStream, OutputStream};
use crate::error::{Result, StreamError};
use crate::port::{Port, PortDirection, PortUsage};
use crate::sri::StreamSri;
use crate::stats::{PortStatistics, StatisticsRecorder};
use crate::transport::StreamTransport;
use crate::types::{StreamElement, Timestamp};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Routing rule restricting a stream to specific connections.
///
/// Once any rule names this port, a stream only reaches the connections a
/// rule pairs it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub port_name: String,
    pub stream_id: String,
    pub connection_id: String,
}

struct StreamRoute {
    sri: StreamSri,
    /// Connections that received `sri`
    connections: HashSet<String>,
}

struct Connection<T> {
    id: String,
    transport: Arc<dyn StreamTransport<T>>,
}

struct OutState<T> {
    connections: Vec<Connection<T>>,
    streams: HashMap<String, StreamRoute>,
    filters: Vec<ConnectionFilter>,
    /// Connections whose last push failed; further failures are not logged
    failing: HashSet<String>,
    stats: StatisticsRecorder,
}

impl<T> OutState<T> {
    fn is_routed(&self, port_name: &str, stream_id: &str, connection_id: &str) -> bool {
        let mut listed = false;
        for rule in self.filters.iter().filter(|rule| rule.port_name == port_name) {
            listed = true;
            if rule.stream_id == stream_id && rule.connection_id == connection_id {
                return true;
            }
        }
        !listed
    }

    fn report(&mut self, port_name: &str, connection_id: &str, call: &str, err: &StreamError) {
        if self.failing.insert(connection_id.to_string()) {
            tracing::warn!(
                "{} failed, port/connection {}/{}: {}",
                call,
                port_name,
                connection_id,
                err
            );
        }
    }

    fn recovered(&mut self, connection_id: &str) {
        self.failing.remove(connection_id);
    }
}

/// Producer-side port connected to zero or more consumers.
pub struct OutPort<T> {
    name: String,
    /// Packet size for [`OutPort::create_configured_stream`]
    buffer_size: usize,
    state: Mutex<OutState<T>>,
    _element: PhantomData<fn(T)>,
}

impl<T: StreamElement> OutPort<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let stats = StatisticsRecorder::new(name.clone(), T::BITS);
        Self::build(name, 0, stats)
    }

    pub fn with_config(
        name: impl Into<String>,
        config: &crate::config::StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let stats = config.statistics.recorder(&name, T::BITS);
        Ok(Self::build(name, config.output.buffer_size, stats))
    }

    fn build(name: String, buffer_size: usize, stats: StatisticsRecorder) -> Self {
        Self {
            name,
            buffer_size,
            state: Mutex::new(OutState {
                connections: Vec::new(),
                streams: HashMap::new(),
                filters: Vec::new(),
                failing: HashSet::new(),
                stats,
            }),
            _element: PhantomData,
        }
    }

    /// Attach a consumer under `connection_id`
    pub fn connect_port(
        &self,
        transport: Arc<dyn StreamTransport<T>>,
        connection_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.connections.iter().any(|c| c.id == connection_id) {
            return Err(StreamError::InvalidArgument(format!(
                "Connection '{}' already exists on port '{}'",
                connection_id, self.name
            )));
        }
        state.connections.push(Connection {
            id: connection_id.to_string(),
            transport,
        });
        tracing::debug!("Port '{}' connected '{}'", self.name, connection_id);
        Ok(())
    }

    /// Detach a consumer, ending every stream it had seen
    pub fn disconnect_port(&self, connection_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .connections
            .iter()
            .position(|c| c.id == connection_id)
            .ok_or_else(|| {
                StreamError::InvalidArgument(format!(
                    "No connection '{}' on port '{}'",
                    connection_id, self.name
                ))
            })?;
        let connection = state.connections.remove(index);

        let mut ended: Vec<String> = state
            .streams
            .iter()
            .filter(|(_, route)| route.connections.contains(connection_id))
            .map(|(stream_id, _)| stream_id.clone())
            .collect();
        ended.sort();

        for stream_id in &ended {
            if let Err(e) =
                connection
                    .transport
                    .push_packet(&[], Timestamp::not_set(), true, stream_id)
            {
                tracing::warn!(
                    "EOS on disconnect failed, port/connection {}/{}: {}",
                    self.name,
                    connection_id,
                    e
                );
            }
        }

        for route in state.streams.values_mut() {
            route.connections.remove(connection_id);
        }
        state.failing.remove(connection_id);
        tracing::debug!("Port '{}' disconnected '{}'", self.name, connection_id);
        Ok(())
    }

    /// Connection ids in connection order
    pub fn connections(&self) -> Vec<String> {
        self.state
            .lock()
            .connections
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Current descriptor of every stream that has not ended
    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.state
            .lock()
            .streams
            .values()
            .map(|route| route.sri.clone())
            .collect()
    }

    /// Replace the routing table
    pub fn update_connection_filter(&self, filters: Vec<ConnectionFilter>) {
        self.state.lock().filters = filters;
    }

    pub fn enable_stats(&self, enabled: bool) {
        self.state.lock().stats.set_enabled(enabled);
    }

    /// Stream with a default descriptor writing through this port
    pub fn create_stream(self: &Arc<Self>, stream_id: &str) -> OutputStream<T> {
        self.create_stream_with_sri(StreamSri::new(stream_id))
    }

    pub fn create_stream_with_sri(self: &Arc<Self>, sri: StreamSri) -> OutputStream<T> {
        tracing::debug!("Port '{}' creating stream '{}'", self.name, sri.stream_id);
        let transport: Arc<dyn StreamTransport<T>> = self.clone();
        OutputStream::new(sri, transport)
    }

    pub fn create_buffered_stream(
        self: &Arc<Self>,
        stream_id: &str,
        buffer_size: usize,
    ) -> BufferedOutputStream<T> {
        BufferedOutputStream::new(self.create_stream(stream_id), buffer_size)
    }

    /// Buffered stream using the configured `output.buffer_size`
    pub fn create_configured_stream(self: &Arc<Self>, stream_id: &str) -> BufferedOutputStream<T> {
        self.create_buffered_stream(stream_id, self.buffer_size)
    }
}

impl<T: StreamElement> StreamTransport<T> for OutPort<T> {
    fn push_sri(&self, sri: &StreamSri) -> Result<()> {
        let mut state = self.state.lock();
        let mut reached = HashSet::new();
        let mut failures = Vec::new();

        for connection in &state.connections {
            if !state.is_routed(&self.name, &sri.stream_id, &connection.id) {
                continue;
            }
            match connection.transport.push_sri(sri) {
                Ok(()) => {
                    reached.insert(connection.id.clone());
                }
                Err(e) => failures.push((connection.id.clone(), e)),
            }
        }

        for id in &reached {
            state.recovered(id);
        }
        for (id, e) in &failures {
            state.report(&self.name, id, "pushSRI", e);
        }
        state.streams.insert(
            sri.stream_id.clone(),
            StreamRoute {
                sri: sri.clone(),
                connections: reached,
            },
        );
        Ok(())
    }

    fn push_packet(&self, data: &[T], time: Timestamp, eos: bool, stream_id: &str) -> Result<()> {
        let started_at = Instant::now();

        let known = self.state.lock().streams.contains_key(stream_id);
        if !known {
            self.push_sri(&StreamSri::new(stream_id))?;
        }

        let mut state = self.state.lock();
        let sri = match state.streams.get(stream_id) {
            Some(route) => route.sri.clone(),
            None => StreamSri::new(stream_id),
        };

        let mut delivered = Vec::new();
        let mut failures = Vec::new();
        for connection in &state.connections {
            if !state.is_routed(&self.name, stream_id, &connection.id) {
                continue;
            }
            let seen = state
                .streams
                .get(stream_id)
                .map(|route| route.connections.contains(&connection.id))
                .unwrap_or(false);

            // Nothing was ever sent on this connection; no EOS to deliver
            if !seen && data.is_empty() {
                continue;
            }
            let result = if seen {
                connection.transport.push_packet(data, time, eos, stream_id)
            } else {
                connection
                    .transport
                    .push_sri(&sri)
                    .and_then(|_| connection.transport.push_packet(data, time, eos, stream_id))
            };
            match result {
                Ok(()) => delivered.push((connection.id.clone(), !seen)),
                Err(e) => failures.push((connection.id.clone(), e)),
            }
        }

        for (id, newly_seen) in &delivered {
            state.recovered(id);
            if *newly_seen {
                if let Some(route) = state.streams.get_mut(stream_id) {
                    route.connections.insert(id.clone());
                }
            }
        }
        for (id, e) in &failures {
            state.report(&self.name, id, "pushPacket", e);
        }

        if eos {
            state.streams.remove(stream_id);
        }
        state
            .stats
            .record(data.len(), 0, 0.0, started_at.elapsed());
        Ok(())
    }
}

impl<T: StreamElement> Port for OutPort<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> PortDirection {
        PortDirection::Output
    }

    fn state(&self) -> PortUsage {
        if self.state.lock().connections.is_empty() {
            PortUsage::Idle
        } else {
            PortUsage::Active
        }
    }

    fn start(&self) {
        tracing::debug!("Output port '{}' started", self.name);
    }

    fn stop(&self) {
        tracing::debug!("Output port '{}' stopped", self.name);
    }

    fn statistics(&self) -> PortStatistics {
        let state = self.state.lock();
        let mut stream_ids: Vec<String> = state.streams.keys().cloned().collect();
        stream_ids.sort();
        state.stats.snapshot(stream_ids)
    }
}
