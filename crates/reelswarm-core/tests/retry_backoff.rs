//! Retry wrapper timing under paused tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reelswarm_core::fakes::ScriptedGenerator;
use reelswarm_core::provider::retry_with_backoff;
use reelswarm_core::{GenerationRequest, Generator, ProviderError, RetryPolicy, RetryingGenerator};

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay_ms: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_succeed() {
    let inner = ScriptedGenerator::new().respond("Writer", |_, n| {
        if n < 2 {
            Err(ProviderError::Failed("socket closed".to_string()))
        } else {
            Ok("done".to_string())
        }
    });
    let generator = RetryingGenerator::new(inner, policy(5));

    let started = tokio::time::Instant::now();
    let text = generator
        .invoke(&GenerationRequest::text("Writer", "go"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(text, "done");
    // 100ms + 200ms of base delay, plus at most 1s of jitter per retry.
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed <= Duration::from_millis(2_400));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_return_last_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let err = retry_with_backoff(&policy(3), "Writer", || {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ProviderError::Failed(format!("attempt {n}")))
        }
    })
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(err.to_string().contains("attempt 2"));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_wait_twice_as_long() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let started = tokio::time::Instant::now();
    let value = retry_with_backoff(&policy(2), "Writer", || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::RateLimited("429 quota".to_string()))
            } else {
                Ok(7)
            }
        }
    })
    .await
    .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(value, 7);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed <= Duration::from_millis(5_300));
}

#[tokio::test(start_paused = true)]
async fn test_missing_api_key_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let started = tokio::time::Instant::now();
    let err = retry_with_backoff(&policy(10), "Writer", || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ProviderError::MissingApiKey)
        }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ProviderError::MissingApiKey));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_millis(1));
}
