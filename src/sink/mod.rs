//! Multi-stream reassembly sink
//!
//! A [`StreamReassemblySink`] owns an input queue and drains it on a
//! [`ProcessThread`], one packet per iteration, into per-stream
//! [`StreamContainer`]s. Readers wait for either new data or a finished
//! stream and receive everything accumulated since their last read as one
//! [`StreamData`].
//!
//! # Conditions
//!
//! Two condition variables share the sink lock:
//! - `data_ready` fires for every packet
//! - `stream_ended` fires only when a stream reaches EOS
//!
//! A reader waiting for a whole stream is therefore not woken by ordinary
//! data.

mod container;

pub use container::{SriOffset, StreamContainer, StreamData, TimestampOffset};

use crate::config::StreamConfig;
use crate::error::Result;
use crate::input::{BoundedInputQueue, PacketEnvelope, DEFAULT_QUEUE_DEPTH};
use crate::port::Port;
use crate::process::{ProcessResult, ProcessThread};
use crate::sri::StreamSri;
use crate::types::{wait_while, StreamElement, Timeout};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

struct SinkState<T> {
    active: HashMap<String, StreamContainer<T>>,
    finished: VecDeque<StreamContainer<T>>,
    running: bool,
    sequence: u64,
}

impl<T: Clone> SinkState<T> {
    fn is_ready(&self, stream_id: Option<&str>, eos: bool) -> bool {
        let finished = match stream_id {
            Some(id) => self.finished.iter().any(|c| c.stream_id() == id),
            None => !self.finished.is_empty(),
        };
        if finished || eos {
            return finished;
        }
        match stream_id {
            Some(id) => self.active.get(id).map(|c| c.has_data()).unwrap_or(false),
            None => self.active.values().any(|c| c.has_data()),
        }
    }

    fn take_ready(&mut self, stream_id: Option<&str>, eos: bool) -> Option<StreamData<T>> {
        let finished = match stream_id {
            Some(id) => self.finished.iter().position(|c| c.stream_id() == id),
            None if self.finished.is_empty() => None,
            None => Some(0),
        };
        if let Some(index) = finished {
            return self.finished.remove(index).map(|mut c| c.get());
        }
        if eos {
            return None;
        }

        let key = match stream_id {
            Some(id) => self
                .active
                .get(id)
                .filter(|c| c.has_data())
                .map(|c| c.stream_id().to_string()),
            None => self
                .active
                .values()
                .filter_map(|c| c.oldest_sequence().map(|seq| (seq, c.stream_id())))
                .min_by_key(|(seq, _)| *seq)
                .map(|(_, id)| id.to_string()),
        }?;
        self.active.get_mut(&key).map(|c| c.get())
    }
}

struct Shared<T> {
    state: Mutex<SinkState<T>>,
    data_ready: Condvar,
    stream_ended: Condvar,
}

impl<T: StreamElement> Shared<T> {
    fn accept(&self, packet: PacketEnvelope<T>) {
        let mut state = self.state.lock();
        let sequence = state.sequence;
        state.sequence += 1;

        let eos = packet.eos;
        let stream_id = packet.stream_id().to_string();
        // Unknown ids start a container; their number is not bounded
        let container = state.active.entry(stream_id.clone()).or_insert_with(|| {
            tracing::debug!("Sink tracking new stream '{}'", stream_id);
            StreamContainer::new(packet.sri.clone())
        });
        container.append(packet, sequence);
        self.data_ready.notify_all();

        if eos {
            if let Some(container) = state.active.remove(&stream_id) {
                tracing::debug!("Sink stream '{}' ended", stream_id);
                state.finished.push_back(container);
            }
            self.stream_ended.notify_all();
        }
    }
}

/// Consumer that merges queued packets per stream.
pub struct StreamReassemblySink<T: StreamElement> {
    port: Arc<BoundedInputQueue<T>>,
    shared: Arc<Shared<T>>,
    thread: Mutex<Option<ProcessThread>>,
    shutdown_timeout: Duration,
    noop_delay: Duration,
}

impl<T: StreamElement> StreamReassemblySink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let config = StreamConfig::default();
        Self::build(
            Arc::new(BoundedInputQueue::new(name, DEFAULT_QUEUE_DEPTH)),
            &config,
        )
    }

    pub fn with_config(name: impl Into<String>, config: &StreamConfig) -> Result<Self> {
        let port = BoundedInputQueue::with_config(name, config)?;
        Ok(Self::build(Arc::new(port), config))
    }

    fn build(port: Arc<BoundedInputQueue<T>>, config: &StreamConfig) -> Self {
        Self {
            port,
            shared: Arc::new(Shared {
                state: Mutex::new(SinkState {
                    active: HashMap::new(),
                    finished: VecDeque::new(),
                    running: false,
                    sequence: 0,
                }),
                data_ready: Condvar::new(),
                stream_ended: Condvar::new(),
            }),
            thread: Mutex::new(None),
            shutdown_timeout: config.sink.shutdown_timeout(),
            noop_delay: config.sink.noop_delay(),
        }
    }

    /// Input port producers connect to
    pub fn port(&self) -> Arc<BoundedInputQueue<T>> {
        self.port.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Start draining the input port
    pub fn start(&self) -> Result<()> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Ok(());
        }

        self.port.start();
        self.shared.state.lock().running = true;

        let port = self.port.clone();
        let shared = self.shared.clone();
        let name = format!("{}-sink", self.port.name());
        *thread = Some(ProcessThread::spawn(&name, self.noop_delay, move || {
            match port.pop(Timeout::Blocking) {
                Some(packet) => {
                    shared.accept(packet);
                    ProcessResult::Normal
                }
                None => ProcessResult::Noop,
            }
        })?);
        tracing::debug!("Sink '{}' started", self.port.name());
        Ok(())
    }

    /// Stop the port, wake every reader and join the drain thread.
    ///
    /// A drain thread that does not exit within the shutdown timeout is a
    /// fatal error.
    pub fn stop(&self) -> Result<()> {
        self.shared.state.lock().running = false;
        self.port.stop();
        self.shared.data_ready.notify_all();
        self.shared.stream_ended.notify_all();

        let thread = self.thread.lock().take();
        if let Some(mut thread) = thread {
            if let Err(e) = thread.stop(self.shutdown_timeout) {
                tracing::error!("Sink '{}' failed to stop: {}", self.port.name(), e);
                return Err(e);
            }
        }
        tracing::debug!("Sink '{}' stopped", self.port.name());
        Ok(())
    }

    /// Read accumulated data.
    ///
    /// With `eos` set, only a finished stream satisfies the read. Without it,
    /// finished streams are still returned first, then the active stream
    /// holding the oldest unread packet. Returns `None` when the timeout
    /// passes or the sink stops before anything is ready.
    pub fn read(&self, timeout: Timeout, stream_id: Option<&str>, eos: bool) -> Option<StreamData<T>> {
        let condition = if eos {
            &self.shared.stream_ended
        } else {
            &self.shared.data_ready
        };

        let mut state = self.shared.state.lock();
        wait_while(condition, &mut state, timeout, |s| {
            s.running && !s.is_ready(stream_id, eos)
        });
        state.take_ready(stream_id, eos)
    }

    /// Active streams plus finished streams not yet read
    pub fn stream_ids(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        let mut ids: Vec<String> = state.active.keys().cloned().collect();
        ids.sort();
        ids.extend(state.finished.iter().map(|c| c.stream_id().to_string()));
        ids
    }

    /// Latest descriptor of every active stream
    pub fn active_sris(&self) -> Vec<StreamSri> {
        self.shared
            .state
            .lock()
            .active
            .values()
            .map(|c| c.latest_sri().clone())
            .collect()
    }
}

impl<T: StreamElement> Drop for StreamReassemblySink<T> {
    fn drop(&mut self) {
        if self.thread.get_mut().is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!("Sink dropped without a clean stop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamTransport;
    use crate::types::Timestamp;
    use std::thread;

    fn push(sink: &StreamReassemblySink<f32>, id: &str, len: usize, eos: bool) {
        sink.port()
            .push_packet(&vec![1.0; len], Timestamp::now(), eos, id)
            .unwrap();
    }

    #[test]
    fn test_read_any_stream() {
        let sink = StreamReassemblySink::<f32>::new("sink");
        sink.start().unwrap();
        push(&sink, "a", 4, false);

        let data = sink.read(Timeout::After(Duration::from_secs(1)), None, false).unwrap();
        assert_eq!(data.stream_id, "a");
        assert_eq!(data.len(), 4);
        assert!(!data.eos);
        sink.stop().unwrap();
    }

    #[test]
    fn test_read_eos_waits_for_end() {
        let sink = StreamReassemblySink::<f32>::new("sink");
        sink.start().unwrap();
        push(&sink, "a", 4, false);
        push(&sink, "a", 3, false);

        assert!(sink
            .read(Timeout::After(Duration::from_millis(50)), Some("a"), true)
            .is_none());

        push(&sink, "a", 2, true);
        let data = sink.read(Timeout::After(Duration::from_secs(1)), Some("a"), true).unwrap();
        assert_eq!(data.len(), 9);
        assert!(data.eos);
        assert!(sink.stream_ids().is_empty());
        sink.stop().unwrap();
    }

    #[test]
    fn test_read_times_out_without_data() {
        let sink = StreamReassemblySink::<f32>::new("sink");
        sink.start().unwrap();
        assert!(sink.read(Timeout::After(Duration::from_millis(20)), None, false).is_none());
        assert!(sink.read(Timeout::NonBlocking, Some("x"), false).is_none());
        sink.stop().unwrap();
    }

    #[test]
    fn test_stop_releases_reader() {
        let sink = Arc::new(StreamReassemblySink::<f32>::new("sink"));
        sink.start().unwrap();
        let reader = {
            let sink = sink.clone();
            thread::spawn(move || sink.read(Timeout::Blocking, None, true))
        };
        thread::sleep(Duration::from_millis(20));
        sink.stop().unwrap();
        assert!(reader.join().unwrap().is_none());
        assert!(!sink.is_running());
    }

    #[test]
    fn test_not_running_read_returns_none() {
        let sink = StreamReassemblySink::<f32>::new("sink");
        assert!(sink.read(Timeout::Blocking, None, false).is_none());
    }
}
