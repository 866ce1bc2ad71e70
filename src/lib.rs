//! # streamio: flow-controlled streaming ports
//!
//! The streaming data-transport layer of a software-defined-radio component
//! framework. Time-series or burst data and the metadata describing it move
//! between independently scheduled producer and consumer threads with bounded
//! memory and flow control, and end-of-stream or metadata-change signals are
//! never silently lost.
//!
//! ## Architecture
//!
//! - **Producers**: [`OutputStream`] pushes its descriptor lazily ahead of
//!   data; [`BufferedOutputStream`] coalesces writes with sample-accurate
//!   timestamps; [`OutPort`] fans streams out to connected consumers
//! - **Transport**: [`StreamTransport`] is the push-SRI / push-packet seam;
//!   [`ChannelTransport`] carries it across threads over crossbeam channels
//! - **Consumers**: [`BoundedInputQueue`] queues packets with
//!   signal-preserving overflow; [`StreamReassemblySink`] merges them per
//!   stream on a background thread
//! - **Bursts**: [`BurstQueue`] applies threshold backpressure to discrete
//!   bursts
//!
//! ## Example
//!
//! ```ignore
//! use streamio::{OutPort, StreamReassemblySink, Timeout, Timestamp};
//! use std::sync::Arc;
//!
//! let sink = StreamReassemblySink::<f32>::new("sink");
//! sink.start()?;
//!
//! let out = Arc::new(OutPort::<f32>::new("out"));
//! out.connect_port(sink.port(), "conn-1")?;
//!
//! let mut stream = out.create_stream("rx");
//! stream.set_xdelta(1.0e-3);
//! stream.write(&[0.0; 1024], Timestamp::now())?;
//! stream.close()?;
//!
//! let data = sink.read(Timeout::Blocking, Some("rx"), true);
//! sink.stop()?;
//! ```

pub mod burst;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod output;
pub mod port;
pub mod process;
pub mod sink;
pub mod sri;
pub mod stats;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use burst::{Burst, BurstPacket, BurstQueue};
pub use config::StreamConfig;
pub use error::{Result, ResultExt, StreamError};
pub use input::{BoundedInputQueue, PacketEnvelope, UNLIMITED_QUEUE_DEPTH};
pub use output::{BufferedOutputStream, OutPort, OutputStream};
pub use port::{Port, PortDirection, PortUsage};
pub use process::{ProcessResult, ProcessThread};
pub use sink::{StreamData, StreamReassemblySink};
pub use sri::{Keyword, KeywordValue, StreamSri, Units};
pub use stats::{PortStatistics, StatisticsRecorder};
pub use transport::{channel_transport, ChannelTransport, StreamTransport, TransportMessage};
pub use types::{StreamElement, Timeout, Timestamp};
