//! Client-side token budget for outbound model calls
//!
//! Two horizons: a per-minute bucket that refills continuously and a per-day
//! bucket that resets to full every 24 hours. A call proceeds only when both
//! hold enough tokens; both are then debited together.
//!
//! Requests larger than a bucket's capacity can never be satisfied and wait
//! forever. Callers must keep their estimate at or below capacity.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const SECONDS_PER_MINUTE: f64 = 60.0;
/// Slack for floating-point accumulation when comparing balances
const EPSILON: f64 = 1e-9;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default upper bound on a single wait slice
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Budget ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub tokens_per_minute: u32,
    pub tokens_per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            tokens_per_minute: 6_000,
            tokens_per_day: 500_000,
        }
    }
}

/// Tokens currently available in each bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateBudgetSnapshot {
    pub minute_tokens: f64,
    pub day_tokens: f64,
}

#[derive(Debug)]
struct Buckets {
    minute_tokens: f64,
    minute_refilled_at: Instant,
    day_tokens: f64,
    day_reset_at: Instant,
}

impl Buckets {
    fn full(limits: RateLimits, now: Instant) -> Self {
        Self {
            minute_tokens: f64::from(limits.tokens_per_minute),
            minute_refilled_at: now,
            day_tokens: f64::from(limits.tokens_per_day),
            day_reset_at: now,
        }
    }

    /// Credit the minute bucket for elapsed time and reset the day bucket
    /// when its window has passed.
    fn refill(&mut self, limits: RateLimits, now: Instant) {
        let minute_capacity = f64::from(limits.tokens_per_minute);
        let elapsed = now.saturating_duration_since(self.minute_refilled_at);
        let rate = minute_capacity / SECONDS_PER_MINUTE;
        let credited = self.minute_tokens + elapsed.as_secs_f64() * rate;
        self.minute_tokens = credited.min(minute_capacity);
        self.minute_refilled_at = now;

        if now.saturating_duration_since(self.day_reset_at) >= DAY {
            self.day_tokens = f64::from(limits.tokens_per_day);
            self.day_reset_at = now;
        }
    }

    /// How long until `tokens` would fit, assuming no other debits
    fn wait_estimate(&self, limits: RateLimits, tokens: f64, now: Instant) -> Duration {
        let minute_wait = if self.minute_tokens + EPSILON >= tokens {
            Duration::ZERO
        } else {
            let rate = f64::from(limits.tokens_per_minute) / SECONDS_PER_MINUTE;
            if rate > 0.0 {
                Duration::from_secs_f64((tokens - self.minute_tokens) / rate)
            } else {
                Duration::MAX
            }
        };

        let day_wait = if self.day_tokens + EPSILON >= tokens {
            Duration::ZERO
        } else {
            DAY.saturating_sub(now.saturating_duration_since(self.day_reset_at))
        };

        minute_wait.max(day_wait)
    }
}

/// Dual-horizon token bucket, safe to share between sessions
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    poll_interval: Duration,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self::with_poll_interval(limits, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(limits: RateLimits, poll_interval: Duration) -> Self {
        Self {
            limits,
            poll_interval,
            buckets: Mutex::new(Buckets::full(limits, Instant::now())),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buckets> {
        // Bucket arithmetic cannot leave the state half-updated, so a
        // poisoned lock is still usable.
        self.buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Debit `tokens` from both buckets if both can cover it; otherwise
    /// return the estimated wait.
    pub fn try_acquire(&self, tokens: u32) -> Result<(), Duration> {
        let now = Instant::now();
        let wanted = f64::from(tokens);
        let mut buckets = self.lock();
        buckets.refill(self.limits, now);

        if buckets.minute_tokens + EPSILON >= wanted && buckets.day_tokens + EPSILON >= wanted {
            buckets.minute_tokens = (buckets.minute_tokens - wanted).max(0.0);
            buckets.day_tokens = (buckets.day_tokens - wanted).max(0.0);
            Ok(())
        } else {
            Err(buckets.wait_estimate(self.limits, wanted, now))
        }
    }

    /// Wait until both buckets hold `tokens`, then debit them.
    ///
    /// Never returns if `tokens` exceeds either capacity.
    pub async fn acquire(&self, tokens: u32) {
        if tokens > self.limits.tokens_per_minute || tokens > self.limits.tokens_per_day {
            tracing::warn!(
                tokens,
                per_minute = self.limits.tokens_per_minute,
                per_day = self.limits.tokens_per_day,
                "Token request exceeds bucket capacity and can never be granted"
            );
        }

        let mut waited = false;
        loop {
            match self.try_acquire(tokens) {
                Ok(()) => {
                    if waited {
                        tracing::debug!(tokens, "Rate limit budget acquired after waiting");
                    }
                    return;
                }
                Err(estimate) => {
                    if !waited {
                        tracing::info!(
                            tokens,
                            estimated_wait_ms = %estimate.as_millis(),
                            "Rate limit reached, waiting for budget"
                        );
                        waited = true;
                    }
                    let slice = estimate.min(self.poll_interval).max(Duration::from_millis(1));
                    tokio::time::sleep(slice).await;
                }
            }
        }
    }

    pub fn available(&self) -> RateBudgetSnapshot {
        let mut buckets = self.lock();
        buckets.refill(self.limits, Instant::now());
        RateBudgetSnapshot {
            minute_tokens: buckets.minute_tokens,
            day_tokens: buckets.day_tokens,
        }
    }
}
