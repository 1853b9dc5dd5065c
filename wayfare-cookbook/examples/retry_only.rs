//! Minimal, focused retry example: backoff, jitter, and a `should_retry` predicate, invoked
//! directly through `RetryPolicy::execute` — no `tower` service wrapping involved.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use wayfare::{Backoff, Jitter, ResilienceError, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
enum MyError {
    Retryable(&'static str),
    Fatal(&'static str),
}

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MyError::Retryable(msg) => write!(f, "retryable: {}", msg),
            MyError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for MyError {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Retry-Only Example ===\n");

    // 4 total attempts, exponential backoff starting at 50ms, full jitter, retry only on
    // the `Retryable` variant.
    let retry_policy = RetryPolicy::builder()
        .max_attempts(4)?
        .backoff(Backoff::exponential(Duration::from_millis(50)))
        .with_jitter(Jitter::full())
        .should_retry(|err: &MyError| matches!(err, MyError::Retryable(_)))
        .build();

    // A flaky operation: the first two calls fail with a retryable error, the third succeeds.
    let attempts = Arc::new(AtomicUsize::new(0));
    let flaky_attempts = attempts.clone();

    println!("Calling flaky operation (should succeed after retries)...");
    let result = retry_policy
        .execute(move || {
            let flaky_attempts = flaky_attempts.clone();
            async move {
                let n = flaky_attempts.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 | 1 => Err(ResilienceError::Inner(MyError::Retryable("transient upstream"))),
                    _ => Ok(format!("ok on attempt {}", n + 1)),
                }
            }
        })
        .await
        .map_err(|e| e.to_string())?;
    println!("✓ Result: {result}");

    println!("\nCalling a fatal operation (should NOT retry)...");
    let err = retry_policy
        .execute(|| async { Err::<String, _>(ResilienceError::Inner(MyError::Fatal("do not retry"))) })
        .await
        .unwrap_err();
    println!("✗ Returned immediately: {err}");

    Ok(())
}
