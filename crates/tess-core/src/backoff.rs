//! Bounded exponential backoff.

use std::time::Duration;

/// Exponential backoff policy with a hard ceiling on the delay.
///
/// Used by chain reconnection and submission retries. The policy itself is
/// iteration state; callers decide how long to keep retrying.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    /// Policy starting at `initial` and doubling up to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { next: initial, max }
    }

    /// The default policy for chain-facing retries: 5 s doubling to 2 min.
    pub fn chain() -> Self {
        Self::new(
            crate::defaults::CHAIN_BACKOFF_INITIAL,
            crate::defaults::CHAIN_BACKOFF_MAX,
        )
    }

    /// The delay to sleep before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Reset to the initial delay after a successful attempt.
    pub fn reset(&mut self, initial: Duration) {
        self.next = initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset(Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
