//! Attente exponentielle bornée entre deux sondages en échec

use std::time::Duration;

const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MULTIPLIER: f32 = 2.0;
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const MAX_FAILURES: usize = 5;
const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f32,
    pub max: Duration,
    /// Échecs consécutifs avant la pause longue
    pub max_failures: usize,
    pub cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: BACKOFF_INITIAL,
            multiplier: BACKOFF_MULTIPLIER,
            max: BACKOFF_MAX,
            max_failures: MAX_FAILURES,
            cooldown: COOLDOWN,
        }
    }
}

/// Délai à respecter avant le prochain sondage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDelay {
    Backoff(Duration),
    /// Trop d'échecs consécutifs : pause longue, le compteur repart de zéro
    Cooldown(Duration),
}

impl RetryDelay {
    pub fn duration(&self) -> Duration {
        match self {
            RetryDelay::Backoff(d) | RetryDelay::Cooldown(d) => *d,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Option<Duration>,
    failures: usize,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: None,
            failures: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> usize {
        self.failures
    }

    fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            Some(current) => {
                let multiplied = current.mul_f32(self.policy.multiplier.max(1.0));
                multiplied.min(self.policy.max)
            }
            None => self.policy.initial.min(self.policy.max),
        };
        self.current = Some(next);
        next
    }

    pub fn record_failure(&mut self) -> RetryDelay {
        self.failures += 1;
        if self.failures >= self.policy.max_failures.max(1) {
            self.reset();
            return RetryDelay::Cooldown(self.policy.cooldown);
        }
        RetryDelay::Backoff(self.next_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_then_cooldown() {
        let mut backoff = Backoff::new(BackoffPolicy {
            max: Duration::from_millis(1500),
            max_failures: 4,
            ..BackoffPolicy::default()
        });

        assert_eq!(backoff.record_failure(), RetryDelay::Backoff(Duration::from_millis(500)));
        assert_eq!(backoff.record_failure(), RetryDelay::Backoff(Duration::from_millis(1000)));
        assert_eq!(backoff.record_failure(), RetryDelay::Backoff(Duration::from_millis(1500)));
        assert_eq!(backoff.record_failure(), RetryDelay::Cooldown(Duration::from_secs(30)));
        assert_eq!(backoff.consecutive_failures(), 0);
        assert_eq!(backoff.record_failure(), RetryDelay::Backoff(Duration::from_millis(500)));
    }

    #[test]
    fn test_reset_on_success() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.record_failure(), RetryDelay::Backoff(Duration::from_millis(500)));
    }
}
