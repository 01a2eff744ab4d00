//! Error types for layout validation and ID generation.
//!
//! Two families exist:
//! - [`ConfigError`]: raised once, when a [`Layout`] or [`IdGenerator`] is
//!   constructed. Fix the configuration and construct again.
//! - [`Error`]: everything [`IdGenerator`] can return at runtime, with
//!   configuration failures folded in as [`Error::Config`].
//!
//! Sequence exhaustion within a millisecond is never an error. It shows up as
//! added latency in [`IdGenerator::generate`] or as [`Poll::Pending`] from
//! [`IdGenerator::poll_id`].
//!
//! [`Layout`]: crate::Layout
//! [`IdGenerator`]: crate::IdGenerator
//! [`IdGenerator::generate`]: crate::IdGenerator::generate
//! [`IdGenerator::poll_id`]: crate::IdGenerator::poll_id
//! [`Poll::Pending`]: crate::Poll::Pending

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Invalid layout or discriminator values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `node_bits + process_bits + sequence_bits` leaves fewer than 41 bits
    /// for the timestamp.
    #[error(
        "node, process and sequence bits total {total}, which exceeds the maximum of {max}"
    )]
    TooManyBits {
        /// Sum of the three configured widths.
        total: u32,
        /// Largest sum allowed.
        max: u32,
    },

    /// The node id does not fit into `node_bits`.
    #[error("node id {node_id} is out of range (expected 0..={max})")]
    NodeIdOutOfRange {
        /// The rejected value.
        node_id: u64,
        /// Largest node id the layout can encode.
        max: u64,
    },

    /// The process id does not fit into `process_bits`.
    #[error("process id {process_id} is out of range (expected 0..={max})")]
    ProcessIdOutOfRange {
        /// The rejected value.
        process_id: u64,
        /// Largest process id the layout can encode.
        max: u64,
    },
}

/// All error variants that [`IdGenerator`](crate::IdGenerator) can emit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The generator configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The clock reported a time earlier than the last successful
    /// generation. Nothing was generated and the generator state is
    /// unchanged.
    #[error("clock moved backwards: now {now} ms is before last {last} ms; refusing to generate id")]
    ClockMovedBackwards {
        /// The sampled time in milliseconds since the Unix epoch.
        now: i64,
        /// The timestamp of the last generated ID.
        last: i64,
    },

    /// The sampled time cannot be encoded: it lies before the layout epoch
    /// or past the last millisecond the timestamp field can hold.
    #[error("timestamp {now} ms cannot be encoded relative to epoch {epoch} ms")]
    TimestampOutOfRange {
        /// The sampled time in milliseconds since the Unix epoch.
        now: u64,
        /// The layout epoch in milliseconds since the Unix epoch.
        epoch: u64,
    },

    /// The state lock was poisoned by a thread that panicked while holding
    /// it. Not available with the `parking-lot` feature, whose mutex does not
    /// poison.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("generator lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` if retrying later may succeed, i.e. the failure came
    /// from the clock rather than from configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ClockMovedBackwards { .. })
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::generator::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
