//! Unbounded retry with exponential backoff for shard downloads

use std::fmt::Display;
use std::time::Duration;

use indicatif::ProgressBar;

/// Exponential backoff schedule: `initial`, `2 * initial`, `4 * initial`, ...
///
/// No attempt cap and no delay ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
}

impl BackoffPolicy {
    pub const fn new(initial: Duration) -> Self {
        Self { initial }
    }

    /// Delay after the `failures`-th consecutive failure (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Value produced by [`retry_forever`] plus how many attempts it took
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Call `attempt_fn` until it succeeds.
///
/// After every failure: log, update the progress bar, sleep the next backoff
/// delay, then run `between` (e.g. rebuild the HTTP session) before trying
/// again. Never gives up.
pub fn retry_forever<T, E: Display>(
    label: &str,
    policy: BackoffPolicy,
    pb: &ProgressBar,
    mut attempt_fn: impl FnMut() -> Result<T, E>,
    mut between: impl FnMut(),
) -> Retried<T> {
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        match attempt_fn() {
            Ok(value) => return Retried { value, attempts },
            Err(e) => {
                let delay = policy.delay(attempts);
                pb.set_message(format!("retry {attempts} in {:.1}s...", delay.as_secs_f64()));
                log::warn!(
                    "{label}: attempt {attempts} failed: {e}, retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                std::thread::sleep(delay);
                between();
            }
        }
    }
}
