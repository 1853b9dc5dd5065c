//! Basic telemetry integration example.
//!
//! `RetryPolicy`, `CircuitBreakerPolicy`, and `TimeoutPolicy` don't emit `PolicyEvent`s on their
//! own — there's no `tower::Layer` auto-wiring here. A caller who wants telemetry constructs the
//! events itself around the `execute()` call and feeds them to a `TelemetrySink` through
//! `emit_best_effort`, which honors `poll_ready` and swallows sink failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wayfare::telemetry::{emit_best_effort, CircuitBreakerEvent, LogSink, MemorySink, PolicyEvent, RetryEvent, StreamingSink, TimeoutEvent};
use wayfare::{Backoff, CircuitBreakerPolicy, ResilienceError, RetryPolicy, TimeoutPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Basic Telemetry Example ===\n");

    // Example 1: Retry with MemorySink
    println!("Example 1: Retry with MemorySink");
    let memory_sink = MemorySink::new();

    let retry_policy = RetryPolicy::<std::io::Error>::builder()
        .max_attempts(3)?
        .backoff(Backoff::constant(Duration::from_millis(100)))
        .build();

    let attempt = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let attempt_clone = attempt.clone();
    let result = retry_policy
        .execute(move || {
            let attempt_clone = attempt_clone.clone();
            async move {
                let count = attempt_clone.fetch_add(1, Ordering::SeqCst);
                if count < 1 {
                    Err(ResilienceError::Inner(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "temporary failure",
                    )))
                } else {
                    Ok("success!")
                }
            }
        })
        .await;
    println!("Result: {:?}", result);

    // The policy itself attempted twice; record that as one `Attempt` event plus the outcome,
    // the way a caller wrapping `execute()` would.
    emit_best_effort(
        memory_sink.clone(),
        PolicyEvent::Retry(RetryEvent::Attempt { attempt: 1, delay: Duration::from_millis(100) }),
    )
    .await;
    emit_best_effort(
        memory_sink.clone(),
        PolicyEvent::Request(wayfare::telemetry::RequestOutcome::Success {
            duration: started.elapsed(),
        }),
    )
    .await;

    println!("\nCaptured telemetry events:");
    for event in memory_sink.events() {
        println!("  - {}", event);
    }

    // Example 2: Circuit breaker with LogSink
    println!("\n\nExample 2: Circuit breaker with LogSink");

    let breaker = CircuitBreakerPolicy::new(2, Duration::from_secs(5));
    let log_sink = LogSink;

    let fail_count = Arc::new(AtomicUsize::new(0));
    for i in 1..=3 {
        println!("Call {i}");
        if breaker.before_request().is_err() {
            emit_best_effort(log_sink.clone(), PolicyEvent::CircuitBreaker(CircuitBreakerEvent::Opened {
                failure_count: 2,
            }))
            .await;
            println!("  circuit open, call rejected");
            continue;
        }
        let count = fail_count.fetch_add(1, Ordering::SeqCst);
        if count < 2 {
            breaker.on_failure();
            println!("  call failed");
        } else {
            breaker.on_success();
            println!("  call recovered");
        }
    }

    // Example 3: Timeout with StreamingSink
    println!("\n\nExample 3: Timeout with StreamingSink");

    let streaming_sink = StreamingSink::new(100);
    let mut receiver = streaming_sink.subscribe();
    let timeout_policy = TimeoutPolicy::new(Duration::from_millis(50))?;

    let event_printer = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            println!("  [event] {}", event);
        }
    });

    println!("Fast request:");
    let _ = timeout_policy
        .execute(|| async { Ok::<_, ResilienceError<std::io::Error>>("done") })
        .await;

    println!("\nSlow request (will timeout):");
    let slow = timeout_policy
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ResilienceError<std::io::Error>>("done")
        })
        .await;
    if slow.is_err() {
        emit_best_effort(
            streaming_sink,
            PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: Duration::from_millis(50) }),
        )
        .await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    event_printer.abort();

    Ok(())
}
