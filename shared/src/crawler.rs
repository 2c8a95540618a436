use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio_retry::strategy::{jitter, FixedInterval};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;

use crate::error::MainError;

/// Runs `f` until the process is told to stop.
///
/// Every invocation is expected to run to completion (catch up with the
/// chain) and return. Successful invocations are followed by a pause of
/// `interval`; failed ones are retried on the same interval, with jitter, for
/// as long as the error is retryable. With `once`, `f` runs a single time and
/// its result is returned as is.
pub async fn crawl<F, Fut>(
    f: F,
    interval: Duration,
    once: bool,
    must_exit: CancellationToken,
) -> Result<(), MainError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), MainError>>,
{
    if once {
        return f().await;
    }

    let retry_strategy = FixedInterval::new(interval).map(jitter);

    while !must_exit.is_cancelled() {
        let result = RetryIf::spawn(
            retry_strategy.clone(),
            &f,
            |e: &MainError| {
                tracing::warn!(reason = %e, "Crawl failed");
                !must_exit.is_cancelled() && e.is_retryable()
            },
        )
        .await;

        if let Err(error) = result {
            if must_exit.is_cancelled() {
                break;
            }
            return Err(error);
        }

        tokio::select! {
            _ = must_exit.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Crawler stopped");

    Ok(())
}

/// Token cancelled on Ctrl-C. Share it with anything that blocks for long
/// (the RPC rate limiter) so shutdown does not wait on it.
pub fn must_exit_handle() -> CancellationToken {
    let handle = CancellationToken::new();
    let task_handle = handle.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Error receiving interrupt signal");
        tracing::info!("Interrupt received, stopping...");
        task_handle.cancel();
    });
    handle
}
