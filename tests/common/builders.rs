//! Test data builders for creating stream descriptors

use streamio::{KeywordValue, StreamSri, Units};

/// Builder for creating test SRIs
pub struct SriBuilder {
    sri: StreamSri,
}

impl SriBuilder {
    pub fn new(stream_id: &str) -> Self {
        Self {
            sri: StreamSri::new(stream_id),
        }
    }

    pub fn xdelta(mut self, xdelta: f64) -> Self {
        self.sri.xdelta = xdelta;
        self
    }

    pub fn xstart(mut self, xstart: f64) -> Self {
        self.sri.xstart = xstart;
        self
    }

    pub fn frames(mut self, subsize: usize, ydelta: f64) -> Self {
        self.sri.subsize = subsize;
        self.sri.ydelta = ydelta;
        self.sri.yunits = Units::Frequency;
        self
    }

    pub fn complex(mut self) -> Self {
        self.sri.complex = true;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.sri.blocking = true;
        self
    }

    pub fn keyword(mut self, id: &str, value: impl Into<KeywordValue>) -> Self {
        self.sri.set_keyword(id, value);
        self
    }

    pub fn build(self) -> StreamSri {
        self.sri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sri_builder() {
        let sri = SriBuilder::new("rx")
            .xdelta(0.5)
            .frames(16, 2.0)
            .keyword("CHAN_RF", 1.0e9)
            .build();

        assert_eq!(sri.stream_id, "rx");
        assert_eq!(sri.xdelta, 0.5);
        assert_eq!(sri.subsize, 16);
        assert!(sri.has_keyword("CHAN_RF"));
        assert!(!sri.blocking);
    }
}
