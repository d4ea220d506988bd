//! Exponential backoff for caller-driven reconnects.

/// Initial delay before the first reconnect attempt.
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Delay ceiling.
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Attempts before giving up.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

pub const BACKOFF_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    attempts: u32,
    delay_ms: u64,
    max_attempts: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::with_max_attempts(MAX_RETRY_ATTEMPTS)
    }
}

impl BackoffState {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            delay_ms: INITIAL_RETRY_DELAY_MS,
            max_attempts,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::with_max_attempts(self.max_attempts);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Advance to the next attempt, updating the delay for the subsequent attempt.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    pub fn next_delay_and_advance(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }

        let current_delay = self.delay_ms;
        self.attempts += 1;
        self.delay_ms =
            ((self.delay_ms as f64) * BACKOFF_MULTIPLIER).min(MAX_RETRY_DELAY_MS as f64) as u64;
        Some(current_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let mut backoff = BackoffState::default();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay_and_advance()).collect();

        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000, 30_000, 30_000, 30_000]
        );
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next_delay_and_advance(), None);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = BackoffState::with_max_attempts(2);
        backoff.next_delay_and_advance();
        backoff.next_delay_and_advance();
        assert!(backoff.is_exhausted());

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay_and_advance(), Some(INITIAL_RETRY_DELAY_MS));
    }
}
