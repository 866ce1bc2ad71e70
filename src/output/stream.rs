//! Output stream with lazy descriptor propagation.

use crate::error::{Result, StreamError};
use crate::sri::{Keyword, KeywordValue, StreamSri};
use crate::transport::StreamTransport;
use crate::types::{StreamElement, Timestamp};
use std::sync::Arc;

macro_rules! scalar_setters {
    ($($setter:ident => $field:ident : $ty:ty),* $(,)?) => {
        $(
            /// Unchanged values leave the stream clean.
            pub fn $setter(&mut self, value: $ty) {
                if self.sri.$field != value {
                    self.sri.$field = value;
                    self.modified = true;
                }
            }
        )*
    };
}

/// Producer handle for one stream.
///
/// Descriptor changes only mark the stream dirty. The next send pushes the
/// descriptor ahead of its data, so downstream always sees metadata before
/// the samples it describes.
pub struct OutputStream<T> {
    sri: StreamSri,
    modified: bool,
    transport: Arc<dyn StreamTransport<T>>,
}

impl<T: StreamElement> OutputStream<T> {
    /// New stream; its descriptor goes out with the first write
    pub fn new(sri: StreamSri, transport: Arc<dyn StreamTransport<T>>) -> Self {
        Self {
            sri,
            modified: true,
            transport,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }

    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    /// Whether a descriptor push is pending
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    super::for_each_scalar_setter!(scalar_setters);

    /// Replace all keywords
    pub fn set_keywords(&mut self, keywords: Vec<Keyword>) {
        self.sri.keywords = keywords;
        self.modified = true;
    }

    /// Update the first keyword with `id`, or append one
    pub fn set_keyword(&mut self, id: &str, value: impl Into<KeywordValue>) {
        self.sri.set_keyword(id, value);
        self.modified = true;
    }

    /// Remove the first keyword with `id`
    pub fn erase_keyword(&mut self, id: &str) {
        self.sri.erase_keyword(id);
        self.modified = true;
    }

    /// Replace the whole descriptor. The stream ID cannot change.
    pub fn set_sri(&mut self, sri: StreamSri) -> Result<()> {
        if sri.stream_id != self.sri.stream_id {
            return Err(StreamError::InvalidArgument(format!(
                "SRI stream ID '{}' does not match stream '{}'",
                sri.stream_id, self.sri.stream_id
            )));
        }
        self.sri = sri;
        self.modified = true;
        Ok(())
    }

    /// Send `data` stamped with the time of its first element
    pub fn write(&mut self, data: &[T], time: Timestamp) -> Result<()> {
        self.send(data, time, false)
    }

    /// End the stream with an empty EOS packet
    pub fn close(&mut self) -> Result<()> {
        tracing::debug!("Closing output stream '{}'", self.sri.stream_id);
        self.send(&[], Timestamp::not_set(), true)
    }

    pub(crate) fn send(&mut self, data: &[T], time: Timestamp, eos: bool) -> Result<()> {
        if self.modified {
            self.transport.push_sri(&self.sri)?;
            self.modified = false;
        }
        self.transport
            .push_packet(data, time, eos, &self.sri.stream_id)
    }
}
