//! Token-bucket pacing
//!
//! Replay throttles on recorded inter-arrival gaps: a frame that followed
//! its predecessor by Δ ns costs `1000 × Δ/1e9` tokens, and the bucket
//! refills at `1000 × rate` tokens per second. Steady state therefore
//! advances recorded time `rate` times faster than wall-clock time, while
//! the cap bounds how far a session can burst after an idle stretch.

use std::time::Instant;

/// Tokens granted per second of recorded time
const TOKENS_PER_RECORDED_SECOND: f64 = 1_000.0;

/// Maximum banked tokens
const BUCKET_CAP: f64 = 10_000.0;

/// Token bucket with explicit clock injection (testable)
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket for a session at `rate` (0 < rate <= 100)
    ///
    /// Starts empty: the first paced frame waits for its own cost, so even
    /// short replays are paced instead of bursting through the initial
    /// grant.
    pub fn new(rate: f64, now: Instant) -> Self {
        Self {
            tokens: 0.0,
            refill_per_sec: TOKENS_PER_RECORDED_SECOND * rate,
            last_refill: now,
        }
    }

    /// Token cost of a recorded inter-arrival gap
    #[inline]
    pub fn cost_of_gap(delta_ns: u64) -> f64 {
        TOKENS_PER_RECORDED_SECOND * (delta_ns as f64) / 1e9
    }

    /// Refill from elapsed wall-clock, then try to pay `cost`
    pub fn try_consume(&mut self, cost: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(BUCKET_CAP);

        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Restart the refill clock without touching banked tokens
    ///
    /// Called on resume so a paused stretch does not accrue tokens.
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_refill = now;
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        self.tokens
    }
}
