//! Port throughput statistics
//!
//! Each port owns a [`StatisticsRecorder`] that keeps a rolling window of its
//! most recent calls. Rates are computed over the span of that window when a
//! [`PortStatistics`] snapshot is taken.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of recent calls kept for rate and average calculations
pub const DEFAULT_WINDOW_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    at: Instant,
    elements: usize,
    bursts: usize,
    queue_depth: f64,
    latency: Duration,
}

/// Snapshot of a port's recent activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortStatistics {
    pub port_name: String,
    pub elements_per_second: f64,
    pub bits_per_second: f64,
    pub calls_per_second: f64,
    pub bursts_per_second: f64,
    /// Mean queue fill ratio observed at call entry (0.0 - 1.0+)
    pub average_queue_depth: f64,
    pub average_latency: Duration,
    /// `None` until the first call is recorded
    pub time_since_last_call: Option<Duration>,
    pub flush_count: u64,
    pub stream_ids: Vec<String>,
}

/// Rolling-window recorder for per-call port statistics
#[derive(Debug, Clone)]
pub struct StatisticsRecorder {
    port_name: String,
    bits_per_element: usize,
    enabled: bool,
    window_size: usize,
    records: VecDeque<CallRecord>,
    flush_count: u64,
}

impl StatisticsRecorder {
    pub fn new(port_name: impl Into<String>, bits_per_element: usize) -> Self {
        Self::with_window(port_name, bits_per_element, DEFAULT_WINDOW_SIZE)
    }

    pub fn with_window(
        port_name: impl Into<String>,
        bits_per_element: usize,
        window_size: usize,
    ) -> Self {
        let window_size = window_size.max(1);
        Self {
            port_name: port_name.into(),
            bits_per_element,
            enabled: true,
            window_size,
            records: VecDeque::new(),
            flush_count: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn recording on or off. Disabling discards the current window.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.records.clear();
        }
    }

    /// Record one call
    pub fn record(&mut self, elements: usize, bursts: usize, queue_depth: f64, latency: Duration) {
        if !self.enabled {
            return;
        }
        if self.records.len() >= self.window_size {
            self.records.pop_front();
        }
        self.records.push_back(CallRecord {
            at: Instant::now(),
            elements,
            bursts,
            queue_depth,
            latency,
        });
    }

    pub fn record_flush(&mut self) {
        if self.enabled {
            self.flush_count += 1;
        }
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Number of calls currently in the window
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build a snapshot, tagging it with the port's active stream ids
    pub fn snapshot(&self, stream_ids: Vec<String>) -> PortStatistics {
        let mut stats = PortStatistics {
            port_name: self.port_name.clone(),
            flush_count: self.flush_count,
            stream_ids,
            ..Default::default()
        };

        let (Some(first), Some(last)) = (self.records.front(), self.records.back()) else {
            return stats;
        };

        let now = Instant::now();
        let count = self.records.len();
        let elements: usize = self.records.iter().map(|r| r.elements).sum();
        let bursts: usize = self.records.iter().map(|r| r.bursts).sum();
        let depth: f64 = self.records.iter().map(|r| r.queue_depth).sum();
        let latency: Duration = self.records.iter().map(|r| r.latency).sum();

        let span = now.duration_since(first.at).as_secs_f64();
        if span > 0.0 {
            stats.elements_per_second = elements as f64 / span;
            stats.bits_per_second = stats.elements_per_second * self.bits_per_element as f64;
            stats.calls_per_second = count as f64 / span;
            stats.bursts_per_second = bursts as f64 / span;
        }
        stats.average_queue_depth = depth / count as f64;
        stats.average_latency = latency / count as u32;
        stats.time_since_last_call = Some(now.duration_since(last.at));
        stats
    }
}
