//! Stream descriptor (SRI)
//!
//! A [`StreamSri`] describes a stream's sampling geometry, units and keyed
//! metadata. Producers own and mutate their copy; every push hands the
//! transport its own clone, so a descriptor is never shared after it leaves
//! the producer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit codes for the primary and secondary axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum Units {
    #[default]
    None = 0,
    Time = 1,
    Delay = 2,
    Frequency = 3,
    TimeCode = 4,
    Distance = 5,
    Velocity = 6,
    Acceleration = 7,
    Jerk = 8,
    Doppler = 9,
    DopplerRate = 10,
    Energy = 11,
    Power = 12,
    Mass = 13,
}

impl Units {
    /// Numeric unit code
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Typed keyword value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeywordValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for KeywordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordValue::Bool(v) => write!(f, "{}", v),
            KeywordValue::Int(v) => write!(f, "{}", v),
            KeywordValue::UInt(v) => write!(f, "{}", v),
            KeywordValue::Float(v) => write!(f, "{}", v),
            KeywordValue::String(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! keyword_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(impl From<$ty> for KeywordValue {
            fn from(v: $ty) -> Self {
                KeywordValue::$variant(v as $cast)
            }
        })*
    };
}

keyword_from!(
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for KeywordValue {
    fn from(v: bool) -> Self {
        KeywordValue::Bool(v)
    }
}

impl From<&str> for KeywordValue {
    fn from(v: &str) -> Self {
        KeywordValue::String(v.to_string())
    }
}

impl From<String> for KeywordValue {
    fn from(v: String) -> Self {
        KeywordValue::String(v)
    }
}

/// A named metadata entry. Duplicate ids are allowed; lookups use the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub value: KeywordValue,
}

impl Keyword {
    pub fn new(id: impl Into<String>, value: impl Into<KeywordValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Stream descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSri {
    pub hversion: i32,
    pub stream_id: String,
    /// Primary axis origin
    pub xstart: f64,
    /// Primary axis increment between elements
    pub xdelta: f64,
    pub xunits: Units,
    /// Frame length for 2-D data; 0 for a 1-D stream
    pub subsize: usize,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: Units,
    /// Interleaved real/imaginary samples
    pub complex: bool,
    /// Downstream queues should block rather than purge
    pub blocking: bool,
    pub keywords: Vec<Keyword>,
}

impl StreamSri {
    /// Descriptor with default geometry for `stream_id`
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            hversion: 1,
            stream_id: stream_id.into(),
            xstart: 0.0,
            xdelta: 1.0,
            xunits: Units::Time,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: Units::None,
            complex: false,
            blocking: false,
            keywords: Vec::new(),
        }
    }

    /// First keyword value with the given id
    pub fn keyword(&self, id: &str) -> Option<&KeywordValue> {
        self.keywords.iter().find(|kw| kw.id == id).map(|kw| &kw.value)
    }

    pub fn has_keyword(&self, id: &str) -> bool {
        self.keyword(id).is_some()
    }

    /// Update the first keyword with `id`, or append a new one
    pub fn set_keyword(&mut self, id: &str, value: impl Into<KeywordValue>) {
        let value = value.into();
        match self.keywords.iter_mut().find(|kw| kw.id == id) {
            Some(kw) => kw.value = value,
            None => self.keywords.push(Keyword {
                id: id.to_string(),
                value,
            }),
        }
    }

    /// Remove the first keyword with `id`. Returns whether one was removed.
    pub fn erase_keyword(&mut self, id: &str) -> bool {
        match self.keywords.iter().position(|kw| kw.id == id) {
            Some(index) => {
                self.keywords.remove(index);
                true
            }
            None => false,
        }
    }

    /// Structural comparison.
    ///
    /// Keywords compare by id: for every id present in either descriptor the
    /// first-match values must agree. Order and trailing duplicates are
    /// ignored.
    pub fn compare(a: &StreamSri, b: &StreamSri) -> bool {
        if a.hversion != b.hversion
            || a.stream_id != b.stream_id
            || a.xstart != b.xstart
            || a.xdelta != b.xdelta
            || a.xunits != b.xunits
            || a.subsize != b.subsize
            || a.ystart != b.ystart
            || a.ydelta != b.ydelta
            || a.yunits != b.yunits
            || a.complex != b.complex
            || a.blocking != b.blocking
        {
            return false;
        }

        a.keywords
            .iter()
            .chain(b.keywords.iter())
            .all(|kw| a.keyword(&kw.id) == b.keyword(&kw.id))
    }
}

impl PartialEq for StreamSri {
    fn eq(&self, other: &Self) -> bool {
        StreamSri::compare(self, other)
    }
}

impl Default for StreamSri {
    fn default() -> Self {
        Self::new("")
    }
}
