//! Bounded exponential backoff for read requests.
//!
//! Attempt `k` (1-indexed) that fails is followed by a wait of
//! `min(1000ms * 2^(k-1), 5000ms)`; the last attempt is not followed by a
//! wait. Exhaustion fails with the last attempt's error. There is no jitter
//! and no circuit breaker. Only `Transport::get_with_retry` calls this, so
//! writes are never replayed.

use std::future::Future;
use std::time::Duration;

use tracing::info;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_millis(1000);
pub const MAX_DELAY: Duration = Duration::from_millis(5000);

/// Wait after failed attempt `attempt` (1-indexed).
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    BASE_DELAY.saturating_mul(1u32 << shift).min(MAX_DELAY)
}

/// Run `operation` up to `max_attempts` times (at least once).
pub async fn with_retry<T, E, F, Fut>(operation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(operation, max_attempts, |_| true).await
}

/// Like `with_retry`, but an error for which `retryable` is false is
/// returned at once.
pub async fn with_retry_if<T, E, F, Fut, P>(
    mut operation: F,
    max_attempts: u32,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts || !retryable(&err) => return Err(err),
            Err(_) => {
                let delay = backoff_delay(attempt);
                info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt,
                    max_attempts,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn backoff_schedule_is_capped() {
        let schedule: Vec<u64> = (1..=6).map(|k| backoff_delay(k).as_millis() as u64).collect();
        assert_eq!(schedule, vec![1000, 2000, 4000, 5000, 5000, 5000]);
        assert_eq!(backoff_delay(u32::MAX), MAX_DELAY);
    }

    fn recorder() -> (Arc<Mutex<Vec<Instant>>>, impl Fn() -> usize) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handle = calls.clone();
        let record = move || {
            let mut calls = handle.lock().unwrap();
            calls.push(Instant::now());
            calls.len()
        };
        (calls, record)
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    // The paused clock may land up to a tick past a timer's deadline.
    fn assert_waits(actual: &[Duration], expected_ms: &[u64]) {
        assert_eq!(actual.len(), expected_ms.len(), "waits: {actual:?}");
        for (got, want) in actual.iter().zip(expected_ms) {
            let want = Duration::from_millis(*want);
            assert!(
                *got >= want && *got < want + Duration::from_millis(5),
                "expected {want:?}, waited {got:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_waits() {
        let (calls, record) = recorder();
        let result: Result<&str, String> = with_retry(
            || {
                let n = record();
                async move {
                    if n < 3 {
                        Err(format!("failure {n}"))
                    } else {
                        Ok("payload")
                    }
                }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap(), "payload");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_waits(&gaps(&calls), &[1000, 2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_and_returns_last_error() {
        let (calls, record) = recorder();
        let started = Instant::now();
        let result: Result<(), String> = with_retry(
            || {
                let n = record();
                async move { Err(format!("failure {n}")) }
            },
            3,
        )
        .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.lock().unwrap().len(), 3);
        // 1000 + 2000, nothing after the final attempt.
        assert_waits(&[started.elapsed()], &[3000]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_never_waits() {
        let started = Instant::now();
        let result: Result<(), &str> = with_retry(|| async { Err("down") }, 1).await;
        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let (calls, record) = recorder();
        let result: Result<u8, ()> = with_retry(
            || {
                record();
                async { Ok(1) }
            },
            0,
        )
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let (calls, record) = recorder();
        let started = Instant::now();
        let result: Result<(), &str> = with_retry_if(
            || {
                record();
                async { Err("unauthorized") }
            },
            3,
            |err| *err != "unauthorized",
        )
        .await;

        assert_eq!(result.unwrap_err(), "unauthorized");
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn long_schedule_hits_the_cap() {
        let (calls, record) = recorder();
        let _: Result<(), ()> = with_retry(
            || {
                record();
                async { Err(()) }
            },
            5,
        )
        .await;
        let calls = calls.lock().unwrap();
        assert_waits(&gaps(&calls), &[1000, 2000, 4000, 5000]);
    }
}
