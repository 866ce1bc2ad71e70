//! Error handling for streamio
//!
//! Only synchronous misuse, transport loss, configuration problems and a
//! failed shutdown are errors. Timeouts, queue overflow and pushes against a
//! stopped port are normal outcomes and surface as `None` or empty results.

use std::time::Duration;
use thiserror::Error;

/// Main error type for streamio operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// A caller passed a value that cannot be applied (rejected before any
    /// transport effect)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The peer on the other side of a transport has gone away
    #[error("Transport disconnected: {0}")]
    Disconnected(String),

    /// A consumer thread did not exit within the shutdown timeout
    #[error("Thread '{name}' did not stop within {timeout:?}")]
    ThreadStop { name: String, timeout: Duration },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is a fatal stop failure
    pub fn is_fatal(&self) -> bool {
        match self {
            StreamError::ThreadStop { .. } => true,
            StreamError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for streamio operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| StreamError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StreamError::Io(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::InvalidArgument("stream ID mismatch".to_string());
        assert_eq!(err.to_string(), "Invalid argument: stream ID mismatch");
    }

    #[test]
    fn test_error_with_context() {
        let err = StreamError::Config("bad threshold".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_thread_stop_is_fatal() {
        let err = StreamError::ThreadStop {
            name: "sink".to_string(),
            timeout: Duration::from_millis(10),
        };
        assert!(err.to_string().contains("sink"));
        assert!(err.is_fatal());
        assert!(err.with_context("stop").is_fatal());
        assert!(!StreamError::Disconnected("x".into()).is_fatal());
    }

    #[test]
    fn test_io_result_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = res.context("reading config").unwrap_err();
        assert!(err.to_string().starts_with("reading config"));
    }
}
