//! Core value types shared by every port
//!
//! # Main Types
//!
//! - [`Timestamp`] - Precision time tag attached to the first element of a packet
//! - [`Timeout`] - Wait policy for blocking calls (non-blocking, forever, bounded)
//! - [`StreamElement`] - Element types a port can carry
//!
//! # Timeouts
//!
//! Every bounded wait computes an absolute deadline once, at call entry, and
//! keeps waiting against that same deadline across spurious wakeups. See
//! [`wait_while`].

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Condvar, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::{Duration, Instant};

/// Time code mode: CPU clock
pub const TCM_CPU: u16 = 1;

/// Time code status: timestamp is invalid ("not set")
pub const TCS_INVALID: u16 = 0;

/// Time code status: timestamp is valid
pub const TCS_VALID: u16 = 1;

/// Precision timestamp for the first element of a packet or burst.
///
/// Whole and fractional seconds are kept apart so that extrapolating by tiny
/// sample deltas does not lose precision against a large epoch value. The
/// `Default` value is the "not set" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    /// Time code mode
    pub tcmode: u16,
    /// Time code status (`TCS_VALID` or `TCS_INVALID`)
    pub tcstatus: u16,
    /// Fractional sample offset
    pub toff: f64,
    /// Whole seconds since the Unix epoch
    pub twsec: f64,
    /// Fractional seconds, kept in `[0, 1)`
    pub tfsec: f64,
}

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            tcmode: TCM_CPU,
            tcstatus: TCS_VALID,
            toff: 0.0,
            twsec: now.timestamp() as f64,
            tfsec: f64::from(now.timestamp_subsec_nanos()) * 1e-9,
        }
    }

    /// The "time not set" sentinel
    pub fn not_set() -> Self {
        Self::default()
    }

    /// Valid timestamp at `secs` seconds past the epoch
    pub fn from_secs_f64(secs: f64) -> Self {
        let mut ts = Self {
            tcmode: TCM_CPU,
            tcstatus: TCS_VALID,
            toff: 0.0,
            twsec: secs.trunc(),
            tfsec: secs.fract(),
        };
        ts.normalize();
        ts
    }

    /// Whether this timestamp carries a valid time
    pub fn is_set(&self) -> bool {
        self.tcstatus == TCS_VALID
    }

    /// Seconds since the epoch as a single float
    pub fn as_secs_f64(&self) -> f64 {
        self.twsec + self.tfsec
    }

    /// Convert to a UTC date-time, if valid and representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.is_set() {
            return None;
        }
        let nanos = (self.tfsec * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
        DateTime::from_timestamp(self.twsec as i64, nanos)
    }

    fn normalize(&mut self) {
        let whole = self.tfsec.floor();
        self.twsec += whole;
        self.tfsec -= whole;
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(mut self, offset: f64) -> Timestamp {
        self += offset;
        self
    }
}

impl AddAssign<f64> for Timestamp {
    fn add_assign(&mut self, offset: f64) {
        self.twsec += offset.trunc();
        self.tfsec += offset.fract();
        self.normalize();
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, other: Timestamp) -> f64 {
        (self.twsec - other.twsec) + (self.tfsec - other.tfsec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => write!(f, "not set"),
        }
    }
}

/// Wait policy for blocking calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately if nothing is ready
    NonBlocking,
    /// Wait until ready or the port is stopped
    Blocking,
    /// Wait at most this long
    After(Duration),
}

impl Timeout {
    /// Map a seconds value with the classic sign convention: negative blocks
    /// forever, zero does not block, positive bounds the wait.
    ///
    /// NaN and values too large for a `Duration` block forever.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs < 0.0 {
            Timeout::Blocking
        } else if secs == 0.0 {
            Timeout::NonBlocking
        } else {
            Duration::try_from_secs_f64(secs)
                .map(Timeout::After)
                .unwrap_or(Timeout::Blocking)
        }
    }

    /// Absolute deadline for a bounded wait starting now.
    ///
    /// `None` for unbounded waits, including bounds past what `Instant` can
    /// represent.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::After(d) => Instant::now().checked_add(*d),
            _ => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::NonBlocking
        } else {
            Timeout::After(d)
        }
    }
}

/// Block on `condvar` while `pending` holds, honoring `timeout`.
///
/// The deadline is fixed at entry. Returns with the lock held either when
/// `pending` turns false or when the wait gives up; callers re-inspect the
/// guarded state to tell the two apart.
pub(crate) fn wait_while<T, F>(
    condvar: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    timeout: Timeout,
    mut pending: F,
) where
    F: FnMut(&T) -> bool,
{
    let deadline = timeout.deadline();
    while pending(&**guard) {
        match (timeout, deadline) {
            (Timeout::NonBlocking, _) => return,
            (_, Some(deadline)) => {
                if condvar.wait_until(guard, deadline).timed_out() {
                    return;
                }
            }
            (_, None) => condvar.wait(guard),
        }
    }
}

/// An element type that can flow through a port.
///
/// Ports are generic over their element, so the payload kind is fixed once
/// per port type instead of being inspected on every call.
pub trait StreamElement: Clone + Send + Sync + 'static {
    /// Bits per element, used for throughput statistics
    const BITS: usize;
}

macro_rules! impl_stream_element {
    ($($ty:ty => $bits:expr),* $(,)?) => {
        $(impl StreamElement for $ty {
            const BITS: usize = $bits;
        })*
    };
}

impl_stream_element!(
    i8 => 8,
    u8 => 8,
    i16 => 16,
    u16 => 16,
    i32 => 32,
    u32 => 32,
    i64 => 64,
    u64 => 64,
    f32 => 32,
    f64 => 64,
);

// File URIs and XML documents travel as whole strings, one element each.
impl StreamElement for String {
    const BITS: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_not_set_is_default() {
        let ts = Timestamp::not_set();
        assert!(!ts.is_set());
        assert_eq!(ts, Timestamp::default());
        assert_eq!(ts.to_string(), "not set");
    }

    #[test]
    fn test_now_is_valid() {
        let ts = Timestamp::now();
        assert!(ts.is_set());
        assert!(ts.tfsec >= 0.0 && ts.tfsec < 1.0);
        assert!(ts.twsec > 1_600_000_000.0);
    }

    #[test]
    fn test_add_carries_into_whole_seconds() {
        let ts = Timestamp::from_secs_f64(10.75) + 0.5;
        assert_eq!(ts.twsec, 11.0);
        assert!((ts.tfsec - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_add_sample_deltas() {
        let t0 = Timestamp::from_secs_f64(0.0);
        let t1 = t0 + 0.001 * 10.0;
        assert!((t1.as_secs_f64() - 0.01).abs() < 1e-12);
        assert!(((t1 - t0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_negative_offset_borrows() {
        let ts = Timestamp::from_secs_f64(5.1) + -0.2;
        assert_eq!(ts.twsec, 4.0);
        assert!((ts.tfsec - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_display_valid() {
        let ts = Timestamp::from_secs_f64(0.5);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00.500000Z");
    }

    #[test]
    fn test_timeout_sign_convention() {
        assert_eq!(Timeout::from_secs_f64(-1.0), Timeout::Blocking);
        assert_eq!(Timeout::from_secs_f64(0.0), Timeout::NonBlocking);
        assert_eq!(
            Timeout::from_secs_f64(0.25),
            Timeout::After(Duration::from_millis(250))
        );
        assert_eq!(Timeout::from(Duration::ZERO), Timeout::NonBlocking);
    }

    #[test]
    fn test_timeout_unrepresentable_secs_block() {
        assert_eq!(Timeout::from_secs_f64(f64::NAN), Timeout::Blocking);
        assert_eq!(Timeout::from_secs_f64(1e30), Timeout::Blocking);
        assert_eq!(Timeout::from_secs_f64(f64::INFINITY), Timeout::Blocking);
    }

    #[test]
    fn test_deadline_overflow_is_unbounded() {
        assert!(Timeout::After(Duration::MAX).deadline().is_none());
        assert!(Timeout::After(Duration::from_secs(u64::MAX)).deadline().is_none());
        assert!(Timeout::After(Duration::from_secs(1)).deadline().is_some());
        assert!(Timeout::Blocking.deadline().is_none());
    }

    #[test]
    fn test_wait_while_huge_bound_waits_for_condition() {
        let shared = std::sync::Arc::new((Mutex::new(false), Condvar::new()));
        let setter = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                *shared.0.lock() = true;
                shared.1.notify_all();
            })
        };

        let mut guard = shared.0.lock();
        wait_while(&shared.1, &mut guard, Timeout::After(Duration::MAX), |ready| {
            !*ready
        });
        assert!(*guard);
        drop(guard);
        setter.join().unwrap();
    }

    #[test]
    fn test_wait_while_bounded_gives_up() {
        let lock = Mutex::new(false);
        let cond = Condvar::new();
        let start = Instant::now();
        let mut guard = lock.lock();
        wait_while(
            &cond,
            &mut guard,
            Timeout::After(Duration::from_millis(30)),
            |ready| !*ready,
        );
        assert!(!*guard);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_while_non_blocking_returns_immediately() {
        let lock = Mutex::new(0u32);
        let cond = Condvar::new();
        let mut guard = lock.lock();
        wait_while(&cond, &mut guard, Timeout::NonBlocking, |v| *v == 0);
        assert_eq!(*guard, 0);
    }

    #[test]
    fn test_element_bits() {
        assert_eq!(<u8 as StreamElement>::BITS, 8);
        assert_eq!(<f32 as StreamElement>::BITS, 32);
        assert_eq!(<i64 as StreamElement>::BITS, 64);
        assert_eq!(<String as StreamElement>::BITS, 8);
    }
}
