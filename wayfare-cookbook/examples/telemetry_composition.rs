//! Demonstrates composing telemetry sinks with `MulticastSink` and `FallbackSink`.
//!
//! - Goal: show how to fan out events to multiple sinks and fall back when a primary sink fails.
//! - Behavior: Multicast sends each event to memory + log; Fallback routes to a secondary sink on error.
//! - Expected output: printed events from the log sink, memory sink counts, and streamed events.
//! - Run with: `cargo run --example telemetry_composition`
//!
//! None of these policies auto-wire a sink: each example below runs the policy directly and
//! then pushes the events a real caller would have observed (attempt counts, outcomes) through
//! the composed sink itself.

use std::time::Duration;

use wayfare::telemetry::{
    emit_best_effort, FallbackSink, LogSink, MemorySink, MulticastSink, PolicyEvent,
    RequestOutcome, RetryEvent, StreamingSink, TimeoutEvent,
};
use wayfare::{Backoff, ResilienceError, RetryPolicy, TimeoutPolicy};

const STREAM_PROCESSING_POLL_DELAY_MS: u64 = 50;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Telemetry Sink Composition Example ===\n");

    // Example 1: MulticastSink - send events to both sinks
    println!("Example 1: MulticastSink (events go to both memory and log)");

    let memory_sink = MemorySink::new();
    let multicast = MulticastSink::new(memory_sink.clone(), LogSink);

    let retry_policy = RetryPolicy::<std::io::Error>::builder()
        .max_attempts(2)?
        .backoff(Backoff::constant(Duration::from_millis(50)))
        .build();

    let attempt = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let attempt_clone = attempt.clone();
    let result = retry_policy
        .execute(move || {
            let attempt_clone = attempt_clone.clone();
            async move {
                let count = attempt_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if count == 0 {
                    Err(ResilienceError::Inner(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "first attempt failed",
                    )))
                } else {
                    Ok("success")
                }
            }
        })
        .await?;
    println!("\nResult: {result:?}");

    emit_best_effort(
        multicast.clone(),
        PolicyEvent::Retry(RetryEvent::Attempt { attempt: 1, delay: Duration::from_millis(50) }),
    )
    .await;
    emit_best_effort(multicast, PolicyEvent::Request(RequestOutcome::Success { duration: Duration::from_millis(50) }))
        .await;

    println!("\nEvents captured in MemorySink:");
    for event in memory_sink.events() {
        println!("  - {event}");
    }

    // Example 2: FallbackSink - primary with fallback
    println!("\n\nExample 2: FallbackSink (try primary, fall back on error)");

    let memory_sink2 = MemorySink::new();
    let fallback_memory = MemorySink::new();

    // MemorySink never errors, so the primary always wins here; a real deployment would put a
    // fallible sink (a network-backed one) in the primary slot.
    let fallback = FallbackSink::new(memory_sink2.clone(), fallback_memory.clone());
    emit_best_effort(fallback, PolicyEvent::CircuitBreaker(wayfare::telemetry::CircuitBreakerEvent::Closed)).await;

    println!("Events in primary MemorySink: {}", memory_sink2.len());
    for event in memory_sink2.events() {
        println!("  - {event}");
    }

    println!("\nEvents in fallback MemorySink: {}", fallback_memory.len());
    if fallback_memory.is_empty() {
        println!("  (empty - primary succeeded)");
    }

    // Example 3: Complex composition - multicast with streaming
    println!("\n\nExample 3: Complex composition (multicast + streaming)");

    let streaming_sink = StreamingSink::new(100);
    let mut receiver = streaming_sink.subscribe();
    let memory_sink3 = MemorySink::new();
    let complex_sink = MulticastSink::new(streaming_sink, memory_sink3.clone());

    let event_printer = tokio::spawn(async move {
        println!("\nStreaming events:");
        while let Ok(event) = receiver.recv().await {
            println!("  [stream] {event}");
        }
        tracing::trace!("streaming receiver closed; shutting down printer task");
    });

    let timeout_policy = TimeoutPolicy::new(Duration::from_millis(100))?;
    let response = timeout_policy
        .execute(|| async { Ok::<_, ResilienceError<std::io::Error>>("fast response") })
        .await?;
    println!("Streaming example response: {response}");

    emit_best_effort(complex_sink, PolicyEvent::Timeout(TimeoutEvent::Occurred { timeout: Duration::from_millis(100) }))
        .await;

    tokio::time::sleep(Duration::from_millis(STREAM_PROCESSING_POLL_DELAY_MS)).await;

    println!("\nAlso stored in memory:");
    for event in memory_sink3.events() {
        println!("  [memory] {event}");
    }

    event_printer.abort();

    println!("\n✓ Telemetry composition working successfully!");

    Ok(())
}
