use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Default epoch: Sunday, January 1, 2023 00:00:00 UTC
pub const DEFAULT_EPOCH: u64 = 1_672_531_200_000;

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: u64 = 1_288_834_974_657;

/// Discord epoch: Thursday, January 1, 2015 00:00:00 UTC
pub const DISCORD_EPOCH: u64 = 1_420_070_400_000;

/// A source of wall-clock milliseconds.
///
/// Implementations return **milliseconds since the Unix epoch**; the
/// generator subtracts its layout epoch itself. This abstraction allows you to
/// plug in the system clock, a monotonic clock, or a mocked time source in
/// tests.
///
/// # Example
///
/// ```
/// use snowgen::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1_700_000_000_000
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1_700_000_000_000);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// The operating system's wall clock.
///
/// This clock follows every adjustment made to the system time, including
/// backward NTP corrections. A generator driven by it reports those as
/// [`Error::ClockMovedBackwards`](crate::Error::ClockMovedBackwards).
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        unix_millis(SystemTime::now())
    }
}

/// A clock that samples the wall clock once and then advances with
/// [`Instant`].
///
/// This avoids wall-clock adjustments (e.g., NTP or daylight savings changes)
/// while still reporting milliseconds since the Unix epoch. Readings never go
/// backward, but they drift from the system clock if it is corrected after
/// construction.
///
/// Clones share the same anchor, so all of them agree on the current time.
#[derive(Copy, Clone, Debug)]
pub struct MonotonicClock {
    start: Instant,
    anchor_millis: u64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Anchors a new clock to the current wall-clock time.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            anchor_millis: unix_millis(SystemTime::now()),
        }
    }

    /// Anchors a new clock to an explicit wall-clock reading, in milliseconds
    /// since the Unix epoch.
    pub fn with_anchor(anchor_millis: u64) -> Self {
        Self {
            start: Instant::now(),
            anchor_millis,
        }
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.anchor_millis.saturating_add(elapsed)
    }
}

fn unix_millis(now: SystemTime) -> u64 {
    // A clock set before 1970 reads as 0, which any layout epoch rejects.
    let since = now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    u64::try_from(since.as_millis()).unwrap_or(u64::MAX)
}
