/// The outcome of a non-blocking generation attempt.
///
/// Returned by [`IdGenerator::poll_id`]:
///
/// - [`Poll::Ready`] carries a freshly generated ID.
/// - [`Poll::Pending`] means every sequence value of the current millisecond
///   has been handed out. The generator state was left untouched; retry once
///   the clock has advanced by `yield_for` milliseconds.
///
/// This allows callers to choose their own backoff (spin, yield, sleep, or an
/// async timer) instead of blocking inside [`IdGenerator::generate`].
///
/// [`IdGenerator::poll_id`]: crate::IdGenerator::poll_id
/// [`IdGenerator::generate`]: crate::IdGenerator::generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Poll {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: i64,
    },
    /// The sequence is exhausted for the current millisecond.
    Pending {
        /// Milliseconds to wait before trying again.
        yield_for: u64,
    },
}

impl Poll {
    /// Returns the ID if one was generated.
    pub const fn ready(self) -> Option<i64> {
        match self {
            Self::Ready { id } => Some(id),
            Self::Pending { .. } => None,
        }
    }
}
