//! A token bucket enforcing a request rate across every call issued through
//! one client.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Rate limiter wait was cancelled")]
pub struct Cancelled;

/// A sustained rate of requests per second plus the number of requests that
/// may be issued back to back before the rate applies.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rate {
    per_second: f64,
    burst: u32,
}

impl Rate {
    /// Create a new [Rate]. A burst of zero is raised to one, otherwise no
    /// request could ever be admitted.
    pub fn new(per_second: f64, burst: u32) -> Self {
        debug_assert!(per_second.is_finite() && per_second > 0.0);
        Rate {
            per_second,
            burst: burst.max(1),
        }
    }

    /// A [Rate] whose burst equals the whole part of the per-second rate.
    pub fn per_second(per_second: f64) -> Self {
        Self::new(per_second, per_second.floor() as u32)
    }

    pub fn requests_per_second(&self) -> f64 {
        self.per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    updated: Instant,
}

/// Given a [Rate] this type admits requests, blocking callers until a token
/// is available. Safe to share between tasks.
#[derive(Debug)]
pub struct RateLimit {
    rate: Rate,
    state: Mutex<State>,
}

// === impl RateLimit ===

impl RateLimit {
    pub fn new(rate: Rate) -> Self {
        let state = State {
            tokens: f64::from(rate.burst),
            updated: Instant::now(),
        };

        RateLimit {
            rate,
            state: Mutex::new(state),
        }
    }

    /// Waits for one token. There is no timeout: the only way out of a long
    /// wait is cancelling `cancel`, in which case the reservation is returned
    /// to the bucket.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let wait = self.reserve().await;
        if wait.is_zero() {
            return Ok(());
        }

        tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limited");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release().await;
                Err(Cancelled)
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    async fn reserve(&self) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        state.tokens -= 1.0;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // Saturates for rates so low the wait overflows a Duration.
            Duration::try_from_secs_f64(-state.tokens / self.rate.per_second)
                .unwrap_or(Duration::MAX)
        }
    }

    async fn release(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens = (state.tokens + 1.0).min(f64::from(self.rate.burst));
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.updated);
        state.tokens = (state.tokens
            + elapsed.as_secs_f64() * self.rate.per_second)
            .min(f64::from(self.rate.burst));
        state.updated = now;
    }
}
