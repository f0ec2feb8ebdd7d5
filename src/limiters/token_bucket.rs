//! Token bucket rate limiting algorithm
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

/// Token bucket over a fixed time unit.
///
/// Tracks consumed tokens rather than remaining ones: a call is admitted
/// while fewer than `burst_size` tokens are consumed, and consumed tokens
/// are released back at `rate_per_unit` per time unit. All state lives in
/// two atomics, so the limiter is shared freely across tasks.
#[derive(Debug)]
pub struct RateLimiter {
    unit_millis: i64,
    consumed_tokens: AtomicI64,
    last_refill_millis: AtomicI64,
}

impl RateLimiter {
    pub fn new(unit: Duration) -> Self {
        Self {
            unit_millis: unit.as_millis() as i64,
            consumed_tokens: AtomicI64::new(0),
            last_refill_millis: AtomicI64::new(0),
        }
    }

    /// Per-minute limiter, the unit used for replication admission control.
    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Try to admit one call under the given burst and sustained rate.
    /// Returns `false` when the burst is exhausted.
    pub fn acquire(&self, burst_size: u32, rate_per_unit: u32) -> bool {
        if burst_size == 0 || rate_per_unit == 0 {
            return false;
        }
        let now = Utc::now().timestamp_millis();
        self.refill(burst_size, rate_per_unit, now);
        self.consume(burst_size)
    }

    fn refill(&self, burst_size: u32, rate_per_unit: u32, now_millis: i64) {
        let refill_time = self.last_refill_millis.load(Ordering::Relaxed);
        let elapsed = now_millis - refill_time;
        let new_tokens = elapsed * i64::from(rate_per_unit) / self.unit_millis;
        if new_tokens <= 0 {
            return;
        }
        // Advance the refill clock only by the time the released tokens
        // account for, so fractional progress is not thrown away.
        let new_refill_time = if refill_time == 0 {
            now_millis
        } else {
            refill_time + new_tokens * self.unit_millis / i64::from(rate_per_unit)
        };
        if self
            .last_refill_millis
            .compare_exchange(refill_time, new_refill_time, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            loop {
                let current = self.consumed_tokens.load(Ordering::Relaxed);
                let adjusted = current.min(i64::from(burst_size));
                let new_level = (adjusted - new_tokens).max(0);
                if self
                    .consumed_tokens
                    .compare_exchange(current, new_level, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
        }
    }

    fn consume(&self, burst_size: u32) -> bool {
        loop {
            let current = self.consumed_tokens.load(Ordering::Relaxed);
            if current >= i64::from(burst_size) {
                return false;
            }
            if self
                .consumed_tokens
                .compare_exchange(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}
