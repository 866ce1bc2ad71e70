//! Per-stream accumulation of packets between reads.

use crate::input::PacketEnvelope;
use crate::sri::StreamSri;
use crate::types::Timestamp;
use serde::Serialize;

/// Descriptor in effect from `offset` onwards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SriOffset {
    pub offset: usize,
    pub sri: StreamSri,
}

/// Time of the element at `offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimestampOffset {
    pub offset: usize,
    pub time: Timestamp,
}

/// Everything a stream accumulated since the previous read, merged.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamData<T> {
    pub stream_id: String,
    pub data: Vec<T>,
    /// Latest descriptor
    pub sri: StreamSri,
    /// First entry at offset 0, then one per descriptor change
    pub sris: Vec<SriOffset>,
    /// One entry per packet that carried a valid time
    pub timestamps: Vec<TimestampOffset>,
    pub eos: bool,
}

impl<T> StreamData<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Data split into `subsize` frames for 2-D streams, or one frame
    pub fn frames(&self) -> Vec<&[T]> {
        if self.data.is_empty() {
            return Vec::new();
        }
        match self.sri.subsize {
            0 => vec![self.data.as_slice()],
            subsize => self.data.chunks(subsize).collect(),
        }
    }
}

#[derive(Debug)]
struct Block<T> {
    data: Vec<T>,
    sri: StreamSri,
    sri_changed: bool,
    time: Timestamp,
    sequence: u64,
}

/// Accumulator for one stream
#[derive(Debug)]
pub struct StreamContainer<T> {
    stream_id: String,
    sri: StreamSri,
    blocks: Vec<Block<T>>,
    eos: bool,
}

impl<T: Clone> StreamContainer<T> {
    pub fn new(sri: StreamSri) -> Self {
        Self {
            stream_id: sri.stream_id.clone(),
            sri,
            blocks: Vec::new(),
            eos: false,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Descriptor as of the last read
    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    /// Most recent descriptor, including unread packets
    pub fn latest_sri(&self) -> &StreamSri {
        self.blocks.last().map(|b| &b.sri).unwrap_or(&self.sri)
    }

    pub fn is_eos(&self) -> bool {
        self.eos
    }

    pub fn has_data(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Arrival order of the oldest unread packet
    pub(crate) fn oldest_sequence(&self) -> Option<u64> {
        self.blocks.first().map(|b| b.sequence)
    }

    /// Append a packet; its EOS flag ends the container
    pub fn append(&mut self, packet: PacketEnvelope<T>, sequence: u64) {
        self.eos |= packet.eos;
        self.blocks.push(Block {
            data: packet.data,
            sri: packet.sri,
            sri_changed: packet.sri_changed,
            time: packet.time,
            sequence,
        });
    }

    /// Merge and drain every unread packet.
    ///
    /// Not idempotent: a second call returns no data until more arrives.
    pub fn get(&mut self) -> StreamData<T> {
        let total: usize = self.blocks.iter().map(|b| b.data.len()).sum();
        let mut data = Vec::with_capacity(total);
        let mut sris: Vec<SriOffset> = Vec::new();
        let mut timestamps = Vec::new();

        for block in self.blocks.drain(..) {
            let offset = data.len();
            let changed = match sris.last() {
                None => true,
                Some(prev) => block.sri_changed || !StreamSri::compare(&prev.sri, &block.sri),
            };
            if changed {
                sris.push(SriOffset {
                    offset,
                    sri: block.sri.clone(),
                });
            }
            if block.time.is_set() {
                timestamps.push(TimestampOffset {
                    offset,
                    time: block.time,
                });
            }
            data.extend(block.data);
        }

        if let Some(last) = sris.last() {
            self.sri = last.sri.clone();
        }

        StreamData {
            stream_id: self.stream_id.clone(),
            data,
            sri: self.sri.clone(),
            sris,
            timestamps,
            eos: self.eos,
        }
    }
}
