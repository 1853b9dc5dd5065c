//! Timeout policy example: a bounded operation invoked directly through
//! `TimeoutPolicy::execute`. Composing two timeout policies into a fast-then-slow fallback is
//! just ordinary `match`/`if let` control flow over two `execute()` calls — no algebraic
//! `Policy`/`Layer` combinator is needed.

use std::time::Duration;

use wayfare::{ResilienceError, TimeoutPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Timeout Example ===\n");

    let timeout = TimeoutPolicy::new(Duration::from_secs(1))?;

    println!("Calling operation (will succeed)...");
    let response = timeout
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ResilienceError<std::io::Error>>("processed: fast-request".to_string())
        })
        .await?;
    println!("✓ Success: {response}\n");

    let slow_timeout = TimeoutPolicy::new(Duration::from_millis(50))?;

    println!("Calling operation (will timeout)...");
    match slow_timeout
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, ResilienceError<std::io::Error>>("should not reach here".to_string())
        })
        .await
    {
        Ok(_) => panic!("expected timeout but the operation succeeded"),
        Err(e) => println!("✗ Timeout occurred as expected: {e}\n"),
    }

    // A fast-then-slow fallback: try a tight timeout first, fall back to a looser one if it
    // trips. Unlike a `tower` fallback layer, the first attempt already ran to completion (or
    // was dropped on timeout) before the second begins — there's no shared in-flight future.
    println!("=== Fast-then-slow fallback ===\n");
    let fast = TimeoutPolicy::new(Duration::from_millis(50))?;
    let slow = TimeoutPolicy::new(Duration::from_secs(2))?;

    println!("Request takes 100ms - fast will time out, slow will succeed");
    let response = match fast
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ResilienceError<std::io::Error>>("processed: request".to_string())
        })
        .await
    {
        Ok(response) => response,
        Err(_) => {
            slow.execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, ResilienceError<std::io::Error>>("processed: request".to_string())
            })
            .await?
        }
    };
    println!("✓ Success via fallback: {response}");

    Ok(())
}
