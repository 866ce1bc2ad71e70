//! Buffered output stream.
//!
//! Small writes are coalesced into packets of exactly `buffer_size` elements.
//! When a write straddles a packet boundary, the remainder is restamped at
//! `time + xdelta * consumed_samples` so every packet keeps a sample-accurate
//! start time.

use super::stream::OutputStream;
use crate::error::Result;
use crate::sri::{Keyword, KeywordValue, StreamSri};
use crate::types::{StreamElement, Timestamp};

macro_rules! flushing_setters {
    ($($setter:ident => $field:ident : $ty:ty),* $(,)?) => {
        $(
            /// Buffered data is sent under the old value before it changes.
            pub fn $setter(&mut self, value: $ty) -> Result<()> {
                if self.base.sri().$field != value {
                    self.flush()?;
                    self.base.$setter(value);
                }
                Ok(())
            }
        )*
    };
}

pub struct BufferedOutputStream<T> {
    base: OutputStream<T>,
    /// 0 disables buffering
    buffer_size: usize,
    buffer: Vec<T>,
    buffer_time: Timestamp,
}

impl<T: StreamElement> BufferedOutputStream<T> {
    pub fn new(base: OutputStream<T>, buffer_size: usize) -> Self {
        Self {
            base,
            buffer_size,
            buffer: Vec::with_capacity(buffer_size),
            buffer_time: Timestamp::not_set(),
        }
    }

    pub fn stream_id(&self) -> &str {
        self.base.stream_id()
    }

    pub fn sri(&self) -> &StreamSri {
        self.base.sri()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Elements waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Start time of the buffered elements, if any are buffered
    pub fn buffer_time(&self) -> Option<Timestamp> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer_time)
        }
    }

    /// Change the packet size. Shrinking to or below the buffered count
    /// sends the buffer right away.
    pub fn set_buffer_size(&mut self, buffer_size: usize) -> Result<()> {
        if buffer_size == self.buffer_size {
            return Ok(());
        }
        self.buffer_size = buffer_size;
        if buffer_size <= self.buffer.len() {
            self.flush()?;
        }
        let wanted = buffer_size.saturating_sub(self.buffer.len());
        self.buffer.reserve(wanted);
        Ok(())
    }

    pub fn write(&mut self, data: &[T], time: Timestamp) -> Result<()> {
        let mut data = data;
        let mut time = time;

        loop {
            // Large writes into an empty buffer skip the copy
            if self.buffer_size == 0 || (self.buffer.is_empty() && data.len() >= self.buffer_size)
            {
                return self.base.write(data, time);
            }

            if self.buffer.is_empty() {
                self.buffer_time = time;
            }

            let room = self.buffer_size.saturating_sub(self.buffer.len());
            let count = data.len().min(room);
            self.buffer.extend_from_slice(&data[..count]);

            if self.buffer.len() >= self.buffer_size {
                self.flush()?;
            }

            data = &data[count..];
            if data.is_empty() {
                return Ok(());
            }
            time += self.sample_span(count);
        }
    }

    /// Send buffered data now
    pub fn flush(&mut self) -> Result<()> {
        self.send_buffer(false)
    }

    /// End the stream. A non-empty buffer carries the EOS itself.
    pub fn close(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            self.base.close()
        } else {
            self.send_buffer(true)
        }
    }

    super::for_each_scalar_setter!(flushing_setters);

    pub fn set_keywords(&mut self, keywords: Vec<Keyword>) -> Result<()> {
        self.flush()?;
        self.base.set_keywords(keywords);
        Ok(())
    }

    pub fn set_keyword(&mut self, id: &str, value: impl Into<KeywordValue>) -> Result<()> {
        self.flush()?;
        self.base.set_keyword(id, value);
        Ok(())
    }

    pub fn erase_keyword(&mut self, id: &str) -> Result<()> {
        self.flush()?;
        self.base.erase_keyword(id);
        Ok(())
    }

    /// See [`OutputStream::set_sri`]. A rejected descriptor leaves the
    /// buffer untouched.
    pub fn set_sri(&mut self, sri: StreamSri) -> Result<()> {
        if sri.stream_id == self.base.stream_id() {
            self.flush()?;
        }
        self.base.set_sri(sri)
    }

    fn sample_span(&self, elements: usize) -> f64 {
        let sri = self.base.sri();
        let samples = if sri.complex { elements / 2 } else { elements };
        sri.xdelta * samples as f64
    }

    fn send_buffer(&mut self, eos: bool) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        tracing::trace!(
            "Flushing {} buffered elements for '{}'",
            self.buffer.len(),
            self.base.stream_id()
        );
        let result = self.base.send(&self.buffer, self.buffer_time, eos);
        self.buffer.clear();
        result
    }
}
