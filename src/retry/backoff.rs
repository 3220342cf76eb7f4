//! Backoff delay computation: fixed, linear, and exponential strategies
//! with optional uniform jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Pure backoff-delay computation, independent of attempt bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffStrategy {
    pub kind: BackoffKind,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`; 0 disables jitter.
    pub jitter: f64,
}

impl BackoffStrategy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial_delay,
            max_delay,
            multiplier,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Base delay before attempt `attempt + 1`, given the (1-based) attempt
    /// index that just failed.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.kind {
            BackoffKind::Fixed => self.initial_delay,
            BackoffKind::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
                Duration::from_secs_f64(secs)
            }
        };
        delay.min(self.max_delay)
    }

    /// Final delay, including jitter, for attempt `attempt`. Uses a genuine
    /// random source (`rand`), not a deterministic approximation.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let mut rng = rand::thread_rng();
        let factor = rng.gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let strategy = BackoffStrategy::fixed(Duration::from_secs(2));
        assert_eq!(strategy.base_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.base_delay(5), Duration::from_secs(2));
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let strategy = BackoffStrategy {
            kind: BackoffKind::Linear,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(100),
            multiplier: 1.0,
            jitter: 0.0,
        };
        assert_eq!(strategy.base_delay(3), Duration::from_secs(3));
    }

    #[test]
    fn exponential_backoff_caps_at_max_delay() {
        let strategy = BackoffStrategy::exponential(
            Duration::from_secs(1),
            Duration::from_secs(4),
            2.0,
        );
        assert_eq!(strategy.base_delay(1), Duration::from_secs(1));
        assert_eq!(strategy.base_delay(2), Duration::from_secs(2));
        assert_eq!(strategy.base_delay(3), Duration::from_secs(4));
        assert_eq!(strategy.base_delay(4), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let strategy = BackoffStrategy::fixed(Duration::from_secs(10)).with_jitter(0.25);
        for _ in 0..50 {
            let delay = strategy.delay_for(1);
            assert!(delay >= Duration::from_secs_f64(7.5));
            assert!(delay <= Duration::from_secs_f64(12.5));
        }
    }
}
