//! Burst queue with threshold backpressure
//!
//! Bursts are discrete packets that each carry their own descriptor and
//! timestamp. A [`BurstQueue`] holds them in arrival order and blocks
//! producers while its depth is at or above the queue threshold.
//!
//! # State
//!
//! | depth                  | state  |
//! |------------------------|--------|
//! | 0                      | IDLE   |
//! | 0 < depth < threshold  | ACTIVE |
//! | depth >= threshold     | BUSY   |
//!
//! The queue starts stopped. Pushes against a stopped queue, including
//! producers released by `stop()`, are discarded without error.

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::port::{Port, PortDirection, PortUsage};
use crate::sri::StreamSri;
use crate::stats::{PortStatistics, StatisticsRecorder};
use crate::types::{wait_while, StreamElement, Timeout, Timestamp};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

/// Default depth at which producers block
pub const DEFAULT_QUEUE_THRESHOLD: usize = 100;

/// One discrete packet of data
#[derive(Debug, Clone, PartialEq)]
pub struct Burst<T> {
    pub data: Vec<T>,
    pub sri: StreamSri,
    pub timestamp: Timestamp,
    pub eos: bool,
}

impl<T> Burst<T> {
    pub fn new(data: Vec<T>, sri: StreamSri, timestamp: Timestamp, eos: bool) -> Self {
        Self {
            data,
            sri,
            timestamp,
            eos,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.sri.stream_id
    }
}

/// A dequeued burst with the producer-blocked flag handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct BurstPacket<T> {
    pub burst: Burst<T>,
    /// A producer had to wait since the flag was last consumed
    pub block_occurred: bool,
}

impl<T> BurstPacket<T> {
    pub fn stream_id(&self) -> &str {
        self.burst.stream_id()
    }
}

struct BurstState<T> {
    queue: VecDeque<Burst<T>>,
    threshold: usize,
    block_occurred: bool,
    started: bool,
    stream_ids: BTreeSet<String>,
    stats: StatisticsRecorder,
}

impl<T> BurstState<T> {
    fn is_full(&self) -> bool {
        self.queue.len() >= self.threshold
    }

    fn depart(&mut self, burst: &Burst<T>) {
        if burst.eos {
            self.stream_ids.remove(burst.stream_id());
        }
    }
}

/// Bounded burst queue for one input port.
pub struct BurstQueue<T> {
    name: String,
    state: Mutex<BurstState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: StreamElement> BurstQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let stats = StatisticsRecorder::new(name.clone(), T::BITS);
        Self::build(name, DEFAULT_QUEUE_THRESHOLD, stats)
    }

    pub fn with_config(name: impl Into<String>, config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let stats = config.statistics.recorder(&name, T::BITS);
        Ok(Self::build(name, config.burst.queue_threshold, stats))
    }

    fn build(name: String, threshold: usize, stats: StatisticsRecorder) -> Self {
        Self {
            name,
            state: Mutex::new(BurstState {
                queue: VecDeque::new(),
                threshold,
                block_occurred: false,
                started: false,
                stream_ids: BTreeSet::new(),
                stats,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue bursts, waiting while the queue is at its threshold.
    pub fn push_bursts(&self, bursts: Vec<Burst<T>>) {
        let started_at = Instant::now();
        if bursts.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        let depth_ratio = state.queue.len() as f64 / state.threshold as f64;

        if state.started && state.is_full() {
            tracing::debug!(
                "Burst port '{}' blocking producer (depth={}, threshold={})",
                self.name,
                state.queue.len(),
                state.threshold
            );
            state.block_occurred = true;
            wait_while(&self.not_full, &mut state, Timeout::Blocking, |s| {
                s.started && s.is_full()
            });
        }

        if !state.started {
            tracing::debug!(
                "Burst port '{}' stopped, discarding {} bursts",
                self.name,
                bursts.len()
            );
            return;
        }

        let count = bursts.len();
        let elements: usize = bursts.iter().map(|b| b.data.len()).sum();
        for burst in bursts {
            state.stream_ids.insert(burst.sri.stream_id.clone());
            state.queue.push_back(burst);
        }
        state
            .stats
            .record(elements, count, depth_ratio, started_at.elapsed());
        tracing::trace!(
            "Burst port '{}' queued {} bursts (depth={})",
            self.name,
            count,
            state.queue.len()
        );
        self.not_empty.notify_all();
    }

    /// Dequeue one burst, handing over the block flag.
    ///
    /// Returns `None` on timeout, or when the queue is stopped and empty.
    pub fn get_burst(&self, timeout: Timeout) -> Option<BurstPacket<T>> {
        let mut state = self.state.lock();
        wait_while(&self.not_empty, &mut state, timeout, |s| {
            s.started && s.queue.is_empty()
        });

        let burst = state.queue.pop_front()?;
        state.depart(&burst);
        let block_occurred = std::mem::take(&mut state.block_occurred);
        self.not_full.notify_all();
        Some(BurstPacket {
            burst,
            block_occurred,
        })
    }

    /// Dequeue everything queued, waiting for at least one burst.
    pub fn get_bursts(&self, timeout: Timeout) -> Vec<Burst<T>> {
        let mut state = self.state.lock();
        wait_while(&self.not_empty, &mut state, timeout, |s| {
            s.started && s.queue.is_empty()
        });

        let bursts: Vec<Burst<T>> = state.queue.drain(..).collect();
        for burst in &bursts {
            state.depart(burst);
        }
        if !bursts.is_empty() {
            self.not_full.notify_all();
        }
        bursts
    }

    pub fn queue_threshold(&self) -> usize {
        self.state.lock().threshold
    }

    /// Change the threshold. Raising it may release blocked producers.
    pub fn set_queue_threshold(&self, threshold: usize) -> Result<()> {
        if threshold == 0 {
            return Err(StreamError::InvalidArgument(
                "queue threshold must be at least 1".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let raised = threshold > state.threshold;
        state.threshold = threshold;
        if raised {
            self.not_full.notify_all();
        }
        Ok(())
    }

    /// Drop every queued burst
    pub fn flush(&self) {
        let mut state = self.state.lock();
        tracing::debug!(
            "Burst port '{}' flushing {} bursts",
            self.name,
            state.queue.len()
        );
        let dropped: Vec<Burst<T>> = state.queue.drain(..).collect();
        for burst in &dropped {
            state.depart(burst);
        }
        state.stats.record_flush();
        self.not_full.notify_all();
    }

    /// Read and clear the producer-blocked flag
    pub fn block_occurred(&self) -> bool {
        std::mem::take(&mut self.state.lock().block_occurred)
    }

    pub fn depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Streams with queued or delivered bursts and no EOS dequeued yet
    pub fn stream_ids(&self) -> Vec<String> {
        self.state.lock().stream_ids.iter().cloned().collect()
    }

    pub fn enable_stats(&self, enabled: bool) {
        self.state.lock().stats.set_enabled(enabled);
    }
}

impl<T: StreamElement> Port for BurstQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> PortDirection {
        PortDirection::Input
    }

    fn state(&self) -> PortUsage {
        let state = self.state.lock();
        PortUsage::from_depth(state.queue.len(), state.threshold)
    }

    fn start(&self) {
        self.state.lock().started = true;
        tracing::debug!("Burst port '{}' started", self.name);
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.started = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        tracing::debug!("Burst port '{}' stopped", self.name);
    }

    fn statistics(&self) -> PortStatistics {
        let state = self.state.lock();
        state
            .stats
            .snapshot(state.stream_ids.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn burst(id: &str, len: usize, eos: bool) -> Burst<u8> {
        Burst::new(vec![0; len], StreamSri::new(id), Timestamp::now(), eos)
    }

    fn started(threshold: usize) -> BurstQueue<u8> {
        let queue = BurstQueue::new("bursts");
        queue.set_queue_threshold(threshold).unwrap();
        queue.start();
        queue
    }

    #[test]
    fn test_starts_stopped_and_discards() {
        let queue = BurstQueue::<u8>::new("bursts");
        assert!(!queue.is_started());
        queue.push_bursts(vec![burst("a", 4, false)]);
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_fifo_and_stream_ids() {
        let queue = started(10);
        queue.push_bursts(vec![burst("a", 1, false), burst("b", 2, false)]);
        assert_eq!(queue.stream_ids(), vec!["a".to_string(), "b".to_string()]);

        let first = queue.get_burst(Timeout::NonBlocking).unwrap();
        assert_eq!(first.stream_id(), "a");
        assert!(!first.block_occurred);

        queue.push_bursts(vec![burst("a", 1, true)]);
        let rest = queue.get_bursts(Timeout::NonBlocking);
        assert_eq!(rest.len(), 2);
        assert_eq!(queue.stream_ids(), vec!["b".to_string()]);
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let queue = BurstQueue::<u8>::new("bursts");
        assert!(matches!(
            queue.set_queue_threshold(0),
            Err(StreamError::InvalidArgument(_))
        ));
        assert_eq!(queue.queue_threshold(), DEFAULT_QUEUE_THRESHOLD);
    }

    #[test]
    fn test_get_burst_times_out() {
        let queue = started(4);
        let start = Instant::now();
        assert!(queue.get_burst(Timeout::After(Duration::from_millis(25))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert!(queue.get_bursts(Timeout::NonBlocking).is_empty());
    }

    #[test]
    fn test_producer_released_by_dequeue() {
        let queue = Arc::new(started(2));
        queue.push_bursts(vec![burst("a", 1, false), burst("a", 1, false)]);
        assert_eq!(queue.state(), PortUsage::Busy);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push_bursts(vec![burst("a", 1, false)]))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.depth(), 2);

        let packet = queue.get_burst(Timeout::NonBlocking).unwrap();
        assert!(packet.block_occurred);
        producer.join().unwrap();
        assert_eq!(queue.depth(), 2);
        assert!(!queue.block_occurred());
    }

    #[test]
    fn test_producer_released_by_threshold_raise() {
        let queue = Arc::new(started(1));
        queue.push_bursts(vec![burst("a", 1, false)]);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push_bursts(vec![burst("a", 1, false)]))
        };
        thread::sleep(Duration::from_millis(20));
        queue.set_queue_threshold(5).unwrap();
        producer.join().unwrap();
        assert_eq!(queue.depth(), 2);
        assert!(queue.block_occurred());
        assert!(!queue.block_occurred());
    }

    #[test]
    fn test_stop_discards_blocked_producer() {
        let queue = Arc::new(started(1));
        queue.push_bursts(vec![burst("a", 1, false)]);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push_bursts(vec![burst("a", 1, false)]))
        };
        thread::sleep(Duration::from_millis(20));
        queue.stop();
        producer.join().unwrap();
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_flush_records_statistic() {
        let queue = started(10);
        queue.push_bursts(vec![burst("a", 3, false), burst("b", 1, true)]);
        queue.flush();
        assert_eq!(queue.depth(), 0);
        assert_eq!(queue.stream_ids(), vec!["a".to_string()]);

        let stats = queue.statistics();
        assert_eq!(stats.flush_count, 1);
        assert_eq!(stats.stream_ids, vec!["a".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_state_follows_depth(threshold in 1usize..20, depth in 0usize..40) {
            let queue = started(threshold.max(depth + 1));
            let bursts: Vec<Burst<u8>> = (0..depth).map(|_| burst("s", 1, false)).collect();
            queue.push_bursts(bursts);
            queue.set_queue_threshold(threshold).unwrap();

            let expected = if depth == 0 {
                PortUsage::Idle
            } else if depth >= threshold {
                PortUsage::Busy
            } else {
                PortUsage::Active
            };
            prop_assert_eq!(queue.state(), expected);
        }
    }
}
