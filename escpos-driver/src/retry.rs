//! Exponential backoff retry engine
//!
//! [`Backoff`] wraps any fallible operation over a mutable target (usually a
//! connection). When the operation fails and the classifier accepts the
//! error, the engine calls the before-delay hook, sleeps, calls the
//! after-delay hook and tries again with the delay multiplied by the policy
//! factor. Transports use the hook pair to release and catch their link
//! around the sleep; the engine itself knows nothing about transports.
//!
//! ```ignore
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), 2)?;
//! let value = Backoff::new(&policy)
//!     .retry_if(|e: &PrintError| e.is_transient())
//!     .before_delay(|conn: &mut Conn, _| conn.drop_link())
//!     .after_delay(|conn: &mut Conn, _| conn.reopen_link())
//!     .run(&mut conn, |conn| conn.send(data))?;
//! ```

use std::fmt::Display;
use std::time::Duration;

use tracing::warn;

use crate::error::{PrintError, PrintResult};

/// Number of tries before giving up
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Delay before the first retry
pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// Multiplier applied to the delay after every retry
pub const DEFAULT_FACTOR: u32 = 2;

/// Validated backoff configuration
///
/// `max_tries >= 1`, `delay > 0` and `factor > 1` hold for every value of
/// this type; [`RetryPolicy::new`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_tries: u32,
    delay: Duration,
    factor: u32,
}

impl RetryPolicy {
    pub fn new(max_tries: u32, delay: Duration, factor: u32) -> PrintResult<Self> {
        if max_tries == 0 {
            return Err(PrintError::InvalidArgument(format!(
                "max tries must be greater than 0; got {}",
                max_tries
            )));
        }
        if delay.is_zero() {
            return Err(PrintError::InvalidArgument(format!(
                "delay must be greater than 0; got {:?}",
                delay
            )));
        }
        if factor <= 1 {
            return Err(PrintError::InvalidArgument(format!(
                "backoff factor must be greater than 1; got {}",
                factor
            )));
        }
        Ok(Self {
            max_tries,
            delay,
            factor,
        })
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            delay: DEFAULT_DELAY,
            factor: DEFAULT_FACTOR,
        }
    }
}

type Classifier<'a, E> = Box<dyn Fn(&E) -> bool + 'a>;
type Hook<'a, T, E> = Box<dyn FnMut(&mut T, &E) + 'a>;
type Sleeper<'a> = Box<dyn FnMut(Duration) + 'a>;

/// One configured retry run
///
/// Defaults: every error is retried, both hooks do nothing and the delay is
/// spent in [`std::thread::sleep`].
pub struct Backoff<'a, T, E> {
    policy: RetryPolicy,
    classifier: Classifier<'a, E>,
    before_delay: Hook<'a, T, E>,
    after_delay: Hook<'a, T, E>,
    sleep: Sleeper<'a>,
}

impl<'a, T, E: Display> Backoff<'a, T, E> {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: *policy,
            classifier: Box::new(|_| true),
            before_delay: Box::new(|_, _| {}),
            after_delay: Box::new(|_, _| {}),
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Only errors accepted by `classifier` are retried; others propagate at once.
    pub fn retry_if(mut self, classifier: impl Fn(&E) -> bool + 'a) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Called with the failed error right before sleeping
    pub fn before_delay(mut self, hook: impl FnMut(&mut T, &E) + 'a) -> Self {
        self.before_delay = Box::new(hook);
        self
    }

    /// Called with the failed error right after sleeping
    pub fn after_delay(mut self, hook: impl FnMut(&mut T, &E) + 'a) -> Self {
        self.after_delay = Box::new(hook);
        self
    }

    /// Replace the sleep function (tests use this to record delays)
    pub fn sleep_with(mut self, sleep: impl FnMut(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Invoke `op` until it succeeds, the classifier refuses the error, or
    /// `max_tries` invocations have failed. The last error is returned
    /// unchanged.
    pub fn run<R>(
        mut self,
        target: &mut T,
        mut op: impl FnMut(&mut T) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut remaining = self.policy.max_tries;
        let mut delay = self.policy.delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match op(target) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !(self.classifier)(&err) {
                return Err(err);
            }

            remaining -= 1;
            if remaining == 0 {
                warn!(attempt, error = %err, "backoff retries exhausted");
                return Err(err);
            }

            warn!(
                attempt,
                remaining,
                delay_ms = delay.as_millis() as u64,
                factor = self.policy.factor,
                error = %err,
                "backoff retry"
            );

            (self.before_delay)(target, &err);
            (self.sleep)(delay);
            (self.after_delay)(target, &err);

            delay = delay
                .checked_mul(self.policy.factor)
                .unwrap_or(Duration::MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    struct Boom(u32);

    impl Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom #{}", self.0)
        }
    }

    fn policy(max_tries: u32, delay_secs: u64, factor: u32) -> RetryPolicy {
        RetryPolicy::new(max_tries, Duration::from_secs(delay_secs), factor).unwrap()
    }

    #[test]
    fn test_no_errors_raised() {
        let mut calls = 0u32;
        let slept = RefCell::new(Vec::new());
        let result: Result<&str, Boom> = Backoff::new(&RetryPolicy::default())
            .sleep_with(|d| slept.borrow_mut().push(d))
            .run(&mut calls, |calls| {
                *calls += 1;
                Ok("OK")
            });

        assert_eq!(result, Ok("OK"));
        assert_eq!(calls, 1);
        assert!(slept.borrow().is_empty());
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::new(1, Duration::from_secs(1), 2).is_ok());
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1), 2),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::ZERO, 2),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::from_secs(1), 1),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::from_secs(1), 0),
            Err(PrintError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_tries(), 3);
        assert_eq!(p.delay(), Duration::from_secs(3));
        assert_eq!(p.factor(), 2);
    }

    #[test]
    fn test_fail_twice_then_succeed() {
        let slept = RefCell::new(Vec::new());
        let before = RefCell::new(0u32);
        let after = RefCell::new(0u32);
        let classified = RefCell::new(0u32);
        let mut calls = 0u32;

        let result = Backoff::new(&policy(3, 1, 2))
            .retry_if(|_: &Boom| {
                *classified.borrow_mut() += 1;
                true
            })
            .before_delay(|_, _| *before.borrow_mut() += 1)
            .after_delay(|_, _| *after.borrow_mut() += 1)
            .sleep_with(|d| slept.borrow_mut().push(d))
            .run(&mut calls, |calls| {
                *calls += 1;
                if *calls < 3 { Err(Boom(*calls)) } else { Ok("OK") }
            });

        assert_eq!(result, Ok("OK"));
        assert_eq!(calls, 3);
        assert_eq!(*classified.borrow(), 2);
        assert_eq!(*before.borrow(), 2);
        assert_eq!(*after.borrow(), 2);
        assert_eq!(
            *slept.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        let total: Duration = slept.borrow().iter().sum();
        assert_eq!(total, Duration::from_secs(3));
    }

    #[test]
    fn test_single_try_propagates_without_sleep() {
        let slept = RefCell::new(Vec::new());
        let mut calls = 0u32;

        let result: Result<(), Boom> = Backoff::new(&policy(1, 1, 2))
            .sleep_with(|d| slept.borrow_mut().push(d))
            .run(&mut calls, |calls| {
                *calls += 1;
                Err(Boom(7))
            });

        assert_eq!(result, Err(Boom(7)));
        assert_eq!(calls, 1);
        assert!(slept.borrow().is_empty());
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let slept = RefCell::new(Vec::new());
        let mut calls = 0u32;

        let result: Result<(), Boom> = Backoff::new(&policy(4, 1, 3))
            .sleep_with(|d| slept.borrow_mut().push(d))
            .run(&mut calls, |calls| {
                *calls += 1;
                Err(Boom(*calls))
            });

        assert_eq!(result, Err(Boom(4)));
        assert_eq!(calls, 4);
        assert_eq!(
            *slept.borrow(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(9)
            ]
        );
    }

    #[test]
    fn test_classifier_refusal_stops_immediately() {
        let slept = RefCell::new(Vec::new());
        let mut calls = 0u32;

        let result: Result<(), Boom> = Backoff::new(&policy(5, 1, 2))
            .retry_if(|e: &Boom| e.0 != 2)
            .sleep_with(|d| slept.borrow_mut().push(d))
            .run(&mut calls, |calls| {
                *calls += 1;
                Err(Boom(*calls))
            });

        assert_eq!(result, Err(Boom(2)));
        assert_eq!(calls, 2);
        assert_eq!(slept.borrow().len(), 1);
    }

    #[test]
    fn test_hooks_mutate_target() {
        struct Link {
            open: bool,
            reopened: u32,
        }

        let mut link = Link {
            open: true,
            reopened: 0,
        };

        let result: Result<u32, Boom> = Backoff::new(&policy(3, 1, 2))
            .before_delay(|link: &mut Link, _| link.open = false)
            .after_delay(|link: &mut Link, _| {
                link.open = true;
                link.reopened += 1;
            })
            .sleep_with(|_| {})
            .run(&mut link, |link| {
                if link.reopened == 0 {
                    Err(Boom(0))
                } else {
                    Ok(link.reopened)
                }
            });

        assert_eq!(result, Ok(1));
        assert!(link.open);
    }
}
