//! Transport boundary between producers and consumers.
//!
//! [`StreamTransport`] is the two-call surface every port speaks: push a
//! descriptor, push a packet. Input queues and output fan-outs implement it
//! directly. [`ChannelTransport`] carries the same calls across a thread
//! boundary over a bounded `crossbeam` channel, with a pump thread on the far
//! side replaying them into the real target.

use crate::error::{Result, StreamError};
use crate::sri::StreamSri;
use crate::types::{StreamElement, Timestamp};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receiving side of a stream port.
pub trait StreamTransport<T>: Send + Sync {
    /// Deliver a new or changed descriptor
    fn push_sri(&self, sri: &StreamSri) -> Result<()>;

    /// Deliver one packet of elements whose first element is stamped `time`
    fn push_packet(&self, data: &[T], time: Timestamp, eos: bool, stream_id: &str) -> Result<()>;
}

/// One transport call in flight.
#[derive(Debug, Clone)]
pub enum TransportMessage<T> {
    Sri(StreamSri),
    Packet {
        data: Vec<T>,
        time: Timestamp,
        eos: bool,
        stream_id: String,
    },
}

impl<T> TransportMessage<T> {
    /// Replay this call into `target`
    pub fn deliver(self, target: &dyn StreamTransport<T>) -> Result<()> {
        match self {
            TransportMessage::Sri(sri) => target.push_sri(&sri),
            TransportMessage::Packet {
                data,
                time,
                eos,
                stream_id,
            } => target.push_packet(&data, time, eos, &stream_id),
        }
    }
}

/// Sending half of a channel-backed transport.
///
/// Sends block while the channel is full, so a slow consumer throttles the
/// producer the same way a synchronous remote call would.
pub struct ChannelTransport<T> {
    tx: Sender<TransportMessage<T>>,
}

impl<T> Clone for ChannelTransport<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Create a bounded channel transport: `(sender_side, receiver)`.
pub fn channel_transport<T>(capacity: usize) -> (ChannelTransport<T>, Receiver<TransportMessage<T>>) {
    let (tx, rx) = bounded(capacity);
    (ChannelTransport { tx }, rx)
}

impl<T: StreamElement> StreamTransport<T> for ChannelTransport<T> {
    fn push_sri(&self, sri: &StreamSri) -> Result<()> {
        self.tx
            .send(TransportMessage::Sri(sri.clone()))
            .map_err(|_| StreamError::Disconnected(format!("push_sri({})", sri.stream_id)))
    }

    fn push_packet(&self, data: &[T], time: Timestamp, eos: bool, stream_id: &str) -> Result<()> {
        self.tx
            .send(TransportMessage::Packet {
                data: data.to_vec(),
                time,
                eos,
                stream_id: stream_id.to_string(),
            })
            .map_err(|_| StreamError::Disconnected(format!("push_packet({})", stream_id)))
    }
}

/// Spawn a thread that replays every message from `rx` into `target`.
///
/// The thread exits once all senders are dropped.
pub fn spawn_pump<T: StreamElement>(
    name: &str,
    rx: Receiver<TransportMessage<T>>,
    target: Arc<dyn StreamTransport<T>>,
) -> Result<JoinHandle<()>> {
    let thread_name = name.to_string();
    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            tracing::debug!("Transport pump '{}' started", thread_name);
            for msg in rx.iter() {
                if let Err(e) = msg.deliver(target.as_ref()) {
                    tracing::warn!("Transport pump '{}' delivery failed: {}", thread_name, e);
                }
            }
            tracing::debug!("Transport pump '{}' exiting", thread_name);
        })
        .map_err(|e| StreamError::Io(e).with_context(format!("spawning pump '{}'", name)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Transport that remembers every call
    #[derive(Default)]
    pub(crate) struct RecordingTransport<T> {
        messages: Mutex<Vec<TransportMessage<T>>>,
    }

    impl<T: Clone> RecordingTransport<T> {
        pub(crate) fn messages(&self) -> Vec<TransportMessage<T>> {
            self.messages.lock().clone()
        }

        pub(crate) fn sri_count(&self) -> usize {
            self.messages
                .lock()
                .iter()
                .filter(|m| matches!(m, TransportMessage::Sri(_)))
                .count()
        }

        /// `(data, time, eos)` of every packet, in order
        pub(crate) fn packets(&self) -> Vec<(Vec<T>, Timestamp, bool)> {
            self.messages
                .lock()
                .iter()
                .filter_map(|m| match m {
                    TransportMessage::Packet { data, time, eos, .. } => {
                        Some((data.clone(), *time, *eos))
                    }
                    TransportMessage::Sri(_) => None,
                })
                .collect()
        }
    }

    impl<T: StreamElement> StreamTransport<T> for RecordingTransport<T> {
        fn push_sri(&self, sri: &StreamSri) -> Result<()> {
            self.messages.lock().push(TransportMessage::Sri(sri.clone()));
            Ok(())
        }

        fn push_packet(&self, data: &[T], time: Timestamp, eos: bool, stream_id: &str) -> Result<()> {
            self.messages.lock().push(TransportMessage::Packet {
                data: data.to_vec(),
                time,
                eos,
                stream_id: stream_id.to_string(),
            });
            Ok(())
        }
    }
}
