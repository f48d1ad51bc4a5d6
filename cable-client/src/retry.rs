use std::sync::Arc;
use std::time::Duration;

use cable_wire::{CloseCode, ConnackCode};
use rand::Rng;

/// Why the session left `Opened` (or failed to reach it), fed to the
/// retry filter and used to label pending-operation failures on close.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    ConnectFailed(ConnackCode),
    ServerClosed(CloseCode),
    NetworkError(String),
    PingTimeout,
}

/// A strategy computing a non-negative delay (seconds) from a 1-based
/// retry count.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    Exponential { factor: f64, jitter: f64 },
    Linear { factor: f64, jitter: f64 },
    Random { min: f64, max: f64, jitter: f64 },
    Const { delay: f64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

fn jittered(base: f64, jitter: f64) -> f64 {
    if jitter == 0.0 {
        return base.max(0.0);
    }
    let u: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
    (base + u * jitter * base).max(0.0)
}

impl Backoff {
    /// `count` is 1-based (the first retry is `count == 1`).
    pub fn next(&self, count: u32) -> f64 {
        debug_assert!(count >= 1);
        match *self {
            Backoff::Exponential { factor, jitter } => {
                let d = factor.powi(count as i32 - 1);
                jittered(d, jitter)
            }
            Backoff::Linear { factor, jitter } => {
                let d = factor * count as f64;
                jittered(d, jitter)
            }
            Backoff::Random { min, max, jitter } => {
                let u: f64 = rand::thread_rng().gen_range(0.0..=1.0);
                let d = min + u * (max - min);
                jittered(d, jitter)
            }
            Backoff::Const { delay } => delay.max(0.0),
        }
    }
}

/// Predicate suppressing a retry. Returning `true` means "give up
/// immediately" — named to resolve the polarity the distilled spec left
/// ambiguous (see DESIGN.md).
pub type ShouldSuppress = Arc<dyn Fn(&RetryReason) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    pub limit: Option<u32>,
    pub backoff: Backoff,
    pub should_suppress: Option<ShouldSuppress>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: None,
            backoff: Backoff::default(),
            should_suppress: None,
        }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("limit", &self.limit)
            .field("backoff", &self.backoff)
            .field("should_suppress", &self.should_suppress.is_some())
            .finish()
    }
}

/// Holds `limit`, the current attempt `count`, a [`Backoff`] strategy,
/// and an optional suppression filter. Reset on each successful
/// transition into `Opened`.
#[derive(Debug)]
pub struct RetryController {
    config: RetryConfig,
    count: u32,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, count: 0 }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Returns `(delay, true)` when a reconnect should be attempted
    /// after `delay`, or `(Duration::ZERO, false)` when the caller
    /// should give up.
    pub fn should_retry(&mut self, reason: &RetryReason) -> (Duration, bool) {
        if let Some(suppress) = &self.config.should_suppress {
            if suppress(reason) {
                return (Duration::ZERO, false);
            }
        }
        if let Some(limit) = self.config.limit {
            if self.count >= limit {
                return (Duration::ZERO, false);
            }
        }
        self.count += 1;
        let secs = self.config.backoff.next(self.count);
        (Duration::from_secs_f64(secs), true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn const_backoff_ignores_count() {
        let b = Backoff::Const { delay: 2.5 };
        assert_eq!(b.next(1), 2.5);
        assert_eq!(b.next(10), 2.5);
    }

    #[test]
    fn exponential_backoff_without_jitter() {
        let b = Backoff::Exponential {
            factor: 2.0,
            jitter: 0.0,
        };
        assert_eq!(b.next(1), 1.0);
        assert_eq!(b.next(2), 2.0);
        assert_eq!(b.next(3), 4.0);
    }

    #[test]
    fn linear_backoff_without_jitter() {
        let b = Backoff::Linear {
            factor: 3.0,
            jitter: 0.0,
        };
        assert_eq!(b.next(1), 3.0);
        assert_eq!(b.next(2), 6.0);
    }

    #[test]
    fn limit_exhausted_gives_up() {
        let mut ctrl = RetryController::new(RetryConfig {
            limit: Some(1),
            backoff: Backoff::Const { delay: 0.0 },
            should_suppress: None,
        });
        let (_, retry) = ctrl.should_retry(&RetryReason::PingTimeout);
        assert!(retry);
        let (_, retry) = ctrl.should_retry(&RetryReason::PingTimeout);
        assert!(!retry);
    }

    #[test]
    fn suppress_filter_gives_up_immediately() {
        let mut ctrl = RetryController::new(RetryConfig {
            limit: None,
            backoff: Backoff::Const { delay: 1.0 },
            should_suppress: Some(Arc::new(|reason| {
                matches!(reason, RetryReason::ConnectFailed(ConnackCode::Rejected))
            })),
        });
        let (_, retry) = ctrl.should_retry(&RetryReason::ConnectFailed(ConnackCode::Rejected));
        assert!(!retry);
        let (_, retry) = ctrl.should_retry(&RetryReason::PingTimeout);
        assert!(retry);
    }

    #[test]
    fn reset_restores_count() {
        let mut ctrl = RetryController::new(RetryConfig {
            limit: Some(1),
            backoff: Backoff::Const { delay: 0.0 },
            should_suppress: None,
        });
        ctrl.should_retry(&RetryReason::PingTimeout);
        ctrl.reset();
        let (_, retry) = ctrl.should_retry(&RetryReason::PingTimeout);
        assert!(retry);
    }
}
