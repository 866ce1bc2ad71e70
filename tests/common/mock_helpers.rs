//! Mock construction helpers

use mockall::mock;
use parking_lot::Mutex;
use std::sync::Arc;
use streamio::{Result, StreamSri, StreamTransport, Timestamp, TransportMessage};

// Strict transport for asserting exact call sequences
mock! {
    pub Transport {}

    impl StreamTransport<f32> for Transport {
        fn push_sri(&self, sri: &StreamSri) -> Result<()>;
        fn push_packet(&self, data: &[f32], time: Timestamp, eos: bool, stream_id: &str) -> Result<()>;
    }
}

/// Transport that records every call for later inspection
pub struct RecordingTransport<T> {
    messages: Mutex<Vec<TransportMessage<T>>>,
}

impl<T: Clone> RecordingTransport<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<TransportMessage<T>> {
        self.messages.lock().clone()
    }

    pub fn sris(&self) -> Vec<StreamSri> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                TransportMessage::Sri(sri) => Some(sri.clone()),
                TransportMessage::Packet { .. } => None,
            })
            .collect()
    }

    /// `(stream_id, data, time, eos)` of every packet, in order
    pub fn packets(&self) -> Vec<(String, Vec<T>, Timestamp, bool)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                TransportMessage::Packet {
                    data,
                    time,
                    eos,
                    stream_id,
                } => Some((stream_id.clone(), data.clone(), *time, *eos)),
                TransportMessage::Sri(_) => None,
            })
            .collect()
    }
}

impl<T: Clone + Send + Sync> StreamTransport<T> for RecordingTransport<T> {
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
