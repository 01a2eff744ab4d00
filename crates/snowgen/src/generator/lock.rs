use core::cmp::Ordering;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Decomposed, Error, Layout, LayoutConfig, Result, SystemClock, TimeSource,
    generator::{Mutex, MutexGuard, Poll},
};

/// Sentinel for "no ID generated yet".
const NO_TIMESTAMP: i64 = -1;

/// A snapshot of the mutable generation state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GeneratorState {
    /// Absolute time (ms since the Unix epoch) of the last generated ID, or
    /// `-1` before the first one.
    pub last_timestamp: i64,
    /// Sequence value of the last generated ID.
    pub sequence: u64,
}

impl Default for GeneratorState {
    fn default() -> Self {
        Self {
            last_timestamp: NO_TIMESTAMP,
            sequence: 0,
        }
    }
}

/// A lock-based Snowflake ID generator suitable for multi-threaded
/// environments.
///
/// The generator owns its node and process discriminators, a validated
/// [`Layout`], and a [`TimeSource`]. The last timestamp and sequence live
/// behind a mutex that is held for the whole read-clock, compare, update,
/// compose critical section, so concurrent callers can never observe the same
/// `(timestamp, sequence)` pair.
///
/// There is no global instance: construct one per logical node/process and
/// share it with [`Arc`](std::sync::Arc) if several threads need it.
///
/// ## Guarantees
/// - IDs from one instance strictly increase while the clock does not move
///   backwards.
/// - IDs are globally unique as long as no two live generators share a
///   `(node_id, process_id)` pair and layout.
/// - A backwards clock is reported as [`Error::ClockMovedBackwards`], never
///   papered over.
///
/// # Example
/// ```
/// use snowgen::IdGenerator;
///
/// let generator = IdGenerator::with_defaults(1, 42).unwrap();
///
/// let id = generator.generate().unwrap();
/// let parts = generator.decompose(id);
/// assert_eq!(parts.node_id, 1);
/// assert_eq!(parts.process_id, 42);
/// ```
#[derive(Debug)]
pub struct IdGenerator<T = SystemClock>
where
    T: TimeSource,
{
    layout: Layout,
    node_id: u64,
    process_id: u64,
    pub(crate) state: Mutex<GeneratorState>,
    time: T,
}

impl IdGenerator<SystemClock> {
    /// Creates a generator with [`Layout::default`] and the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either discriminator does not fit the
    /// default layout (node ids `0..=7`, process ids `0..=127`).
    pub fn with_defaults(node_id: u64, process_id: u64) -> Result<Self> {
        Self::new(node_id, process_id, Layout::default(), SystemClock)
    }
}

impl<T> IdGenerator<T>
where
    T: TimeSource,
{
    /// Creates a new [`IdGenerator`] that has not generated anything yet.
    ///
    /// # Parameters
    ///
    /// - `node_id`: the node discriminator, encoded into every ID.
    /// - `process_id`: the process discriminator, encoded into every ID.
    /// - `layout`: the bit widths and epoch.
    /// - `time`: a [`TimeSource`] (e.g. [`SystemClock`] or
    ///   [`MonotonicClock`](crate::MonotonicClock)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a discriminator is out of range for
    /// `layout`.
    pub fn new(node_id: u64, process_id: u64, layout: Layout, time: T) -> Result<Self> {
        Self::from_state(node_id, process_id, layout, GeneratorState::default(), time)
    }

    /// Validates an unchecked [`LayoutConfig`] and creates a generator from
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the widths exceed the 22-bit budget or a
    /// discriminator is out of range.
    ///
    /// # Example
    /// ```
    /// use snowgen::{ConfigError, Error, IdGenerator, LayoutConfig, SystemClock};
    ///
    /// let config = LayoutConfig { node_bits: 4, process_bits: 9, ..LayoutConfig::default() };
    /// let err = IdGenerator::from_config(0, 0, config, SystemClock).unwrap_err();
    /// assert!(matches!(err, Error::Config(ConfigError::TooManyBits { total: 25, .. })));
    /// ```
    pub fn from_config(
        node_id: u64,
        process_id: u64,
        config: LayoutConfig,
        time: T,
    ) -> Result<Self> {
        let layout = Layout::try_from(config)?;
        Self::new(node_id, process_id, layout, time)
    }

    /// Creates a generator that resumes from a previously captured state.
    ///
    /// This is primarily useful for restoring a generator after a restart so
    /// that a clock which regressed across the restart is still detected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a discriminator is out of range for
    /// `layout`.
    pub fn from_state(
        node_id: u64,
        process_id: u64,
        layout: Layout,
        state: GeneratorState,
        time: T,
    ) -> Result<Self> {
        layout.check_discriminators(node_id, process_id)?;
        Ok(Self {
            layout,
            node_id,
            process_id,
            state: Mutex::new(state),
            time,
        })
    }

    /// Generates the next ID, waiting for the next millisecond if the current
    /// one is exhausted.
    ///
    /// The wait spins while holding the state lock, so it also serializes
    /// other callers of this instance. It lasts until the clock ticks, which
    /// is about one millisecond.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockMovedBackwards`] if the clock reads earlier than the
    ///   last generated timestamp. The state is unchanged.
    /// - [`Error::TimestampOutOfRange`] if the clock is before the layout
    ///   epoch or past the last encodable millisecond.
    /// - [`Error::LockPoisoned`] if another thread panicked while holding the
    ///   lock (std mutex only).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate(&self) -> Result<i64> {
        let mut state = self.lock()?;
        let last = state.last_timestamp;
        let now = self.time.current_millis();

        let (timestamp, sequence) = match signed(now).cmp(&last) {
            Ordering::Less => return Err(Self::cold_clock_behind(now, last)),
            Ordering::Equal => {
                let next = state.sequence.wrapping_add(1) & self.layout.max_sequence();
                if next == 0 {
                    (self.cold_wait_past(last)?, 0)
                } else {
                    (now, next)
                }
            }
            Ordering::Greater => (now, 0),
        };

        self.commit(&mut state, timestamp, sequence)
    }

    /// Attempts to generate the next ID without blocking.
    ///
    /// Returns [`Poll::Pending`] instead of waiting when the current
    /// millisecond is exhausted; the state is left as it was, so a retry after
    /// the clock ticks continues exactly where [`Self::generate`] would have.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`].
    ///
    /// # Example
    /// ```
    /// use snowgen::{IdGenerator, Poll};
    ///
    /// let generator = IdGenerator::with_defaults(0, 0).unwrap();
    ///
    /// let id = loop {
    ///     match generator.poll_id().unwrap() {
    ///         Poll::Ready { id } => break id,
    ///         Poll::Pending { .. } => std::thread::yield_now(),
    ///     }
    /// };
    /// assert!(id > 0);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn poll_id(&self) -> Result<Poll> {
        let mut state = self.lock()?;
        let last = state.last_timestamp;
        let now = self.time.current_millis();

        let (timestamp, sequence) = match signed(now).cmp(&last) {
            Ordering::Less => return Err(Self::cold_clock_behind(now, last)),
            Ordering::Equal if state.sequence < self.layout.max_sequence() => {
                (now, state.sequence + 1)
            }
            Ordering::Equal => return Ok(Poll::Pending { yield_for: 1 }),
            Ordering::Greater => (now, 0),
        };

        let id = self.commit(&mut state, timestamp, sequence)?;
        Ok(Poll::Ready { id })
    }

    /// Splits an ID produced by this generator (or any generator sharing its
    /// layout) into its fields.
    pub fn decompose(&self, id: i64) -> Decomposed {
        self.layout.decompose(id)
    }

    /// The bit layout and epoch.
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The node discriminator.
    pub const fn node_id(&self) -> u64 {
        self.node_id
    }

    /// The process discriminator.
    pub const fn process_id(&self) -> u64 {
        self.process_id
    }

    /// The clock driving this generator.
    pub const fn time(&self) -> &T {
        &self.time
    }

    /// Returns a snapshot of the last timestamp and sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the lock is poisoned (std mutex
    /// only).
    pub fn state(&self) -> Result<GeneratorState> {
        Ok(*self.lock()?)
    }

    fn commit(
        &self,
        state: &mut GeneratorState,
        timestamp: u64,
        sequence: u64,
    ) -> Result<i64> {
        if self.layout.offset_of(timestamp).is_none() {
            return Err(Error::TimestampOutOfRange {
                now: timestamp,
                epoch: self.layout.epoch_millis(),
            });
        }

        *state = GeneratorState {
            last_timestamp: signed(timestamp),
            sequence,
        };
        Ok(self
            .layout
            .compose(timestamp, self.node_id, self.process_id, sequence))
    }

    /// Spins until the clock passes `last`.
    #[cold]
    #[inline(never)]
    fn cold_wait_past(&self, last: i64) -> Result<u64> {
        #[cfg(feature = "tracing")]
        tracing::debug!(last, "sequence exhausted, waiting for next millisecond");

        loop {
            core::hint::spin_loop();
            let now = self.time.current_millis();
            match signed(now).cmp(&last) {
                Ordering::Greater => return Ok(now),
                Ordering::Equal => {}
                Ordering::Less => return Err(Self::cold_clock_behind(now, last)),
            }
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last: i64) -> Error {
        let now = signed(now);
        #[cfg(feature = "tracing")]
        tracing::warn!(now, last, "clock moved backwards, refusing to generate id");
        Error::ClockMovedBackwards { now, last }
    }

    fn lock(&self) -> Result<MutexGuard<'_, GeneratorState>> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.state.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(self.state.lock()?)
        }
    }
}

/// Clock readings past `i64::MAX` saturate; the layout rejects them anyway.
fn signed(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}
