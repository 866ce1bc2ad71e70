//! Producer-side output API
//!
//! # Main Types
//!
//! - [`OutputStream`] - Owns a descriptor and pushes it lazily ahead of data
//! - [`BufferedOutputStream`] - Coalesces small writes into fixed-size packets
//! - [`OutPort`] - Fans a stream out to any number of connected transports

mod buffered;
mod port;
mod stream;

pub use buffered::BufferedOutputStream;
pub use port::{ConnectionFilter, OutPort};
pub use stream::OutputStream;

/// Scalar descriptor setters: `setter => field: type`.
macro_rules! for_each_scalar_setter {
    ($callback:ident) => {
        $callback! {
            set_xstart => xstart: f64,
            set_xdelta => xdelta: f64,
            set_xunits => xunits: crate::sri::Units,
            set_subsize => subsize: usize,
            set_ystart => ystart: f64,
            set_ydelta => ydelta: f64,
            set_yunits => yunits: crate::sri::Units,
            set_complex => complex: bool,
            set_blocking => blocking: bool,
        }
    };
}

pub(crate) use for_each_scalar_setter;
