//! Bounded polling.
//!
//! [`poll_until`] replaces open-ended "wait until" loops: it evaluates an
//! async predicate at a fixed interval and gives up after a deadline.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};

/// The predicate did not yield a value within the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Condition not met after {attempts} attempts over {elapsed:?}")]
pub struct RetryTimeout {
    /// Number of times the predicate ran.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Poll `predicate` every `interval` until it yields `Some`, for at most
/// `max_duration`.
///
/// The predicate always runs at least once.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    max_duration: Duration,
    mut predicate: F,
) -> Result<T, RetryTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = predicate().await {
            return Ok(value);
        }
        let elapsed = start.elapsed();
        if elapsed + interval > max_duration {
            return Err(RetryTimeout { attempts, elapsed });
        }
        sleep(interval).await;
    }
}
