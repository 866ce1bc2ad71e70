//! Port abstraction shared by input queues, burst queues and output fan-outs.
//!
//! Every port reports a coarse usage state derived from its queue depth and
//! exposes throughput statistics through [`PortStatistics`].

use crate::stats::PortStatistics;
use serde::{Deserialize, Serialize};

/// Coarse load indicator for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortUsage {
    /// Nothing queued (or, for outputs, nothing connected)
    Idle,
    /// Queue holds data below its limit
    Active,
    /// Queue is at or above its limit
    Busy,
}

impl PortUsage {
    /// Derive usage from a depth and the limit at which the port saturates.
    ///
    /// `depth == 0` is always idle, `depth >= limit` is busy, anything in
    /// between is active.
    pub fn from_depth(depth: usize, limit: usize) -> Self {
        if depth == 0 {
            PortUsage::Idle
        } else if depth >= limit {
            PortUsage::Busy
        } else {
            PortUsage::Active
        }
    }
}

/// Whether a port consumes or produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Common lifecycle and introspection surface of every port.
pub trait Port: Send + Sync {
    fn name(&self) -> &str;

    fn direction(&self) -> PortDirection;

    fn state(&self) -> PortUsage;

    /// Enable blocking waits and accept data
    fn start(&self);

    /// Release every blocked caller; later pushes are discarded
    fn stop(&self);

    fn statistics(&self) -> PortStatistics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_from_depth() {
        assert_eq!(PortUsage::from_depth(0, 10), PortUsage::Idle);
        assert_eq!(PortUsage::from_depth(1, 10), PortUsage::Active);
        assert_eq!(PortUsage::from_depth(9, 10), PortUsage::Active);
        assert_eq!(PortUsage::from_depth(10, 10), PortUsage::Busy);
        assert_eq!(PortUsage::from_depth(11, 10), PortUsage::Busy);
    }

    #[test]
    fn test_usage_threshold_one() {
        assert_eq!(PortUsage::from_depth(0, 1), PortUsage::Idle);
        assert_eq!(PortUsage::from_depth(1, 1), PortUsage::Busy);
    }
}
