//! Exponential backoff policy for transient errors (§7): base 250ms,
//! factor 2, jitter ±25%, cap 30s, max 5 attempts. This module only computes
//! delays — callers own the actual sleep (e.g. `tokio::time::sleep`), the way
//! the rest of the workspace keeps `tokio` out of crates that don't need it.

/// `base_ms * factor^(attempt-1)`, capped at `cap_ms`, with `max_attempts`
/// retries before giving up (§7 taxonomy).
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub factor: f64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_ms: 250, factor: 2.0, cap_ms: 30_000, max_attempts: 5 }
    }
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (1-based first retry). `jitter_seed`
    /// lets callers vary the ±25% jitter deterministically (e.g. resource name
    /// plus attempt number) without pulling in a `rand` dependency.
    pub fn delay_ms(&self, attempt: u32, jitter_seed: u64) -> u64 {
        let raw = self.base_ms as f64 * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = raw.min(self.cap_ms as f64);
        let jitter_fraction = (pseudo_random(jitter_seed) * 0.5) - 0.25; // in [-0.25, 0.25]
        let jittered = capped * (1.0 + jitter_fraction);
        jittered.max(0.0).round() as u64
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Deterministic pseudo-random value in `[0, 1)` derived from `seed`.
fn pseudo_random(seed: u64) -> f64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let policy = BackoffPolicy::default();
        let d1 = policy.delay_ms(1, 1);
        let d2 = policy.delay_ms(2, 1);
        assert!(d1 >= 187 && d1 <= 313); // 250ms ± 25%
        assert!(d2 >= 375 && d2 <= 625); // 500ms ± 25%
        let d_far = policy.delay_ms(20, 1);
        assert!(d_far <= policy.cap_ms + policy.cap_ms / 4);
    }

    #[test]
    fn max_attempts_is_respected() {
        let policy = BackoffPolicy::default();
        assert!(!policy.exhausted(4));
        assert!(policy.exhausted(5));
    }
}
