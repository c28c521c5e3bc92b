// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The exponential-backoff-with-cap idiom shared by every retrying driver: connection restarts
//! (1,2,4,...,60s, reset after 60s stable), `DriverTransient` retries (capped at 5 minutes), and
//! SA-reap retries (fixed 5-attempt budget).

use std::time::Duration;

/// A pure exponential-backoff schedule: `base * 2^attempt`, capped at `max`.
///
/// `attempt` is zero-indexed (the delay before the *first* retry is `delay_for(0)`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Build a schedule doubling from `base`, never exceeding `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Backoff { base, max }
    }

    /// The delay before the `attempt`-th retry (zero-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// The outcome of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded, possibly after some retries.
    Succeeded(T),
    /// Every attempt failed; the last error is returned.
    Exhausted(E),
}

/// Retry an async, fallible operation up to `max_attempts` times (the first call plus
/// `max_attempts - 1` retries), sleeping per `schedule` between attempts.
///
/// `max_attempts` of `0` returns [`RetryOutcome::Exhausted`] by invoking `op` once and
/// reporting its error, matching the convention that every reap/reload attempt counts.
pub async fn retry<T, E, Fut, Op>(
    schedule: Backoff,
    max_attempts: u32,
    mut op: Op,
) -> RetryOutcome<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(err) => {
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(schedule.delay_for(attempt)).await;
                }
            }
        }
    }
    // `attempts >= 1` guarantees the loop ran and set `last_err`.
    #[allow(clippy::unwrap_used)]
    RetryOutcome::Exhausted(last_err.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_then_caps() {
        let schedule = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(schedule.delay_for(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(2), Duration::from_secs(4));
        assert_eq!(schedule.delay_for(6), Duration::from_secs(60));
        assert_eq!(schedule.delay_for(31), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retry_succeeds_without_exhausting_budget() {
        let schedule = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let mut calls = 0;
        let outcome = retry(schedule, 5, || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert!(matches!(outcome, RetryOutcome::Succeeded(3)));
    }

    #[tokio::test]
    async fn retry_reports_exhaustion_after_budget() {
        let schedule = Backoff::new(Duration::from_millis(1), Duration::from_millis(2));
        let mut calls = 0;
        let outcome: RetryOutcome<(), &str> = retry(schedule, 3, || {
            calls += 1;
            async { Err("still failing") }
        })
        .await;
        assert!(matches!(outcome, RetryOutcome::Exhausted("still failing")));
        assert_eq!(calls, 3);
    }
}
