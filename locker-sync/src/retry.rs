//! Bounded retry for store and network calls.
//!
//! One generic helper instead of a retry loop at every call site. The
//! attempt ceiling is fixed and there is no backoff between attempts; rate
//! limiting lives in the catalog client.

use locker_db::operations::OperationError;
use locker_source::{BlobError, SourceError};

/// Default attempt ceiling for every store write and network fetch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Whether an error is worth another attempt.
pub trait Retryable {
    fn is_transient(&self) -> bool {
        true
    }
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}

impl Retryable for OperationError {}
impl Retryable for BlobError {}
impl Retryable for rusqlite::Error {}

/// Run an async operation up to `max_attempts` times, returning the first
/// success or the last error. Non-transient errors return immediately.
pub async fn retry<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                log::debug!("Attempt {attempt}/{max_attempts} failed: {e}");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Blocking twin of [`retry`] for synchronous store calls.
pub fn retry_blocking<T, E, F>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                log::debug!("Attempt {attempt}/{max_attempts} failed: {e}");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn retry_blocking_succeeds_within_budget() {
        let mut calls = 0;
        let result: Result<u32, Flaky> = retry_blocking(5, || {
            calls += 1;
            if calls < 3 { Err(Flaky(true)) } else { Ok(42) }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_blocking_exhausts_ceiling() {
        let mut calls = 0;
        let result: Result<u32, Flaky> = retry_blocking(4, || {
            calls += 1;
            Err(Flaky(true))
        });
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn retry_blocking_stops_on_non_transient() {
        let mut calls = 0;
        let result: Result<u32, Flaky> = retry_blocking(10, || {
            calls += 1;
            Err(Flaky(false))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_async_succeeds_within_budget() {
        let calls = std::cell::Cell::new(0u32);
        let result: Result<u32, Flaky> = retry(5, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 2 { Err(Flaky(true)) } else { Ok(7) } }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }
}
