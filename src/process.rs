//! Process thread for consuming components
//!
//! A [`ProcessThread`] repeatedly calls a service function on a dedicated OS
//! thread until the function reports [`ProcessResult::Finish`] or the thread
//! is stopped. Stopping waits for the thread with a bound; a thread that does
//! not exit in time is a fatal [`StreamError::ThreadStop`].

use crate::error::{Result, StreamError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of one service iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Work was done; call again immediately
    Normal,
    /// Nothing to do; sleep before the next call
    Noop,
    /// Exit the loop
    Finish,
}

pub struct ProcessThread {
    name: String,
    running: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessThread {
    /// Start running `service` on a new thread named `name`
    pub fn spawn<F>(name: &str, noop_delay: Duration, mut service: F) -> Result<Self>
    where
        F: FnMut() -> ProcessResult + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = bounded(1);
        let flag = running.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!("Process thread '{}' started", thread_name);
                while flag.load(Ordering::SeqCst) {
                    match service() {
                        ProcessResult::Normal => {}
                        ProcessResult::Noop => thread::sleep(noop_delay),
                        ProcessResult::Finish => {
                            tracing::debug!("Process thread '{}' finished", thread_name);
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
                let _ = done_tx.send(());
                tracing::debug!("Process thread '{}' exiting", thread_name);
            })
            .map_err(|e| StreamError::Io(e).with_context(format!("spawning thread '{}'", name)))?;

        Ok(Self {
            name: name.to_string(),
            running,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the service loop is still going
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to exit and wait up to `timeout` for it.
    ///
    /// Stopping an already stopped thread is a no-op.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("Process thread '{}' panicked", self.name);
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::error!(
                    "Process thread '{}' did not stop within {:?}",
                    self.name,
                    timeout
                );
                self.handle = Some(handle);
                Err(StreamError::ThreadStop {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }
}

impl Drop for ProcessThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_until_finish() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut thread = ProcessThread::spawn("counter", Duration::from_millis(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) >= 4 {
                ProcessResult::Finish
            } else {
                ProcessResult::Normal
            }
        })
        .unwrap();

        thread.stop(Duration::from_secs(1)).unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
        assert!(!thread.is_running());
    }

    #[test]
    fn test_stop_interrupts_noop_loop() {
        let mut thread =
            ProcessThread::spawn("idle", Duration::from_millis(5), || ProcessResult::Noop).unwrap();
        assert!(thread.is_running());
        thread.stop(Duration::from_secs(1)).unwrap();
        assert!(!thread.is_running());
        // Second stop is a no-op
        thread.stop(Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn test_stuck_thread_is_fatal() {
        let release = Arc::new(AtomicBool::new(false));
        let gate = release.clone();
        let mut thread = ProcessThread::spawn("stuck", Duration::ZERO, move || {
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            ProcessResult::Finish
        })
        .unwrap();

        let err = thread.stop(Duration::from_millis(20)).unwrap_err();
        assert!(err.is_fatal());

        release.store(true, Ordering::SeqCst);
        thread.stop(Duration::from_secs(1)).unwrap();
    }
}
