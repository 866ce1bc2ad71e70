//! Packet envelopes delivered by an input queue.

use crate::sri::StreamSri;
use crate::types::Timestamp;

/// One queued packet plus the signals a consumer must not miss.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEnvelope<T> {
    pub data: Vec<T>,
    /// Time of the first element; `Timestamp::not_set()` for a bare EOS
    pub time: Timestamp,
    pub eos: bool,
    /// Descriptor in effect when the packet was queued
    pub sri: StreamSri,
    /// The consumer has not yet seen `sri`
    pub sri_changed: bool,
    /// Queued packets were dropped before this one was delivered
    pub queue_flushed: bool,
}

impl<T> PacketEnvelope<T> {
    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
