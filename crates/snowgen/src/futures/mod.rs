//! Async generation on Tokio.
//!
//! [`IdGenerator::generate`] blocks its thread while a millisecond is
//! exhausted. Inside an async runtime that would stall a worker, so these
//! helpers drive [`IdGenerator::poll_id`] instead and sleep between attempts
//! without holding the state lock. Dropping the future cancels the wait.

use core::{future::Future, time::Duration};

use crate::{IdGenerator, Poll, Result, TimeSource};

/// Abstracts over how to wait for a given [`Duration`] in async contexts.
pub trait SleepProvider {
    /// Returns a future that completes after roughly `dur`.
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}

/// A [`SleepProvider`] backed by Tokio's timer.
///
/// This is the default provider for [`IdGenerator::generate_async`].
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(dur)
    }
}

/// A [`SleepProvider`] that yields to the Tokio scheduler instead of arming a
/// timer.
///
/// This can improve latency in low-concurrency scenarios, at the cost of
/// tighter polling loops and more CPU while a millisecond is exhausted.
pub struct TokioYield;

impl SleepProvider for TokioYield {
    fn sleep_for(_dur: Duration) -> impl Future<Output = ()> + Send {
        tokio::task::yield_now()
    }
}

impl<T> IdGenerator<T>
where
    T: TimeSource,
{
    /// Generates the next ID, sleeping on Tokio's timer while the current
    /// millisecond is exhausted.
    ///
    /// # Errors
    ///
    /// Same as [`IdGenerator::generate`].
    ///
    /// # Example
    /// ```
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let generator = snowgen::IdGenerator::with_defaults(0, 1).unwrap();
    /// let id = generator.generate_async().await.unwrap();
    /// assert_eq!(generator.decompose(id).process_id, 1);
    /// # }
    /// ```
    pub async fn generate_async(&self) -> Result<i64> {
        self.generate_async_with::<TokioSleep>().await
    }

    /// Like [`Self::generate_async`], with a caller-chosen [`SleepProvider`].
    ///
    /// # Errors
    ///
    /// Same as [`IdGenerator::generate`].
    pub async fn generate_async_with<S>(&self) -> Result<i64>
    where
        S: SleepProvider,
    {
        loop {
            let dur = match self.poll_id()? {
                Poll::Ready { id } => return Ok(id),
                Poll::Pending { yield_for } => Duration::from_millis(yield_for),
            };
            S::sleep_for(dur).await;
        }
    }
}
