//! Consumer-side input port
//!
//! - [`BoundedInputQueue`] - FIFO of packet envelopes with a per-stream
//!   descriptor table, blocking or purging overflow, and stream-filtered pops
//! - [`PacketEnvelope`] - What a pop hands back

mod packet;
mod queue;

pub use packet::PacketEnvelope;
pub use queue::{BoundedInputQueue, SriListener, DEFAULT_QUEUE_DEPTH, UNLIMITED_QUEUE_DEPTH};
