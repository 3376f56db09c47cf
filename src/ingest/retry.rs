/// Bounded retry with jittered exponential backoff.
///
/// Many reach jobs run side by side against the same remote services, so a
/// transient failure (HTTP 429 / 5xx, dropped connection) is retried after a
/// randomized delay instead of failing the whole reach. Non-transient errors
/// return immediately.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::model::InputError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    10
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    300_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff ceiling before jitter for the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Backoff plus uniform jitter in `[0, backoff]`, capped at `max_delay`.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.backoff(attempt).as_millis() as u64;
        let jitter = if ceiling == 0 { 0 } else { rng.gen_range(0..=ceiling) };
        Duration::from_millis((ceiling + jitter).min(self.max_delay_ms))
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt budget
    /// runs out. `sleep` is called between attempts.
    pub fn run_with<T>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, InputError>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, InputError> {
        let mut rng = rand::thread_rng();
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= attempts => {
                    return Err(InputError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.delay(attempt, &mut rng);
                    tracing::debug!(attempt, ?delay, error = %err, "transient failure, retrying");
                    sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// `run_with` using the real clock.
    pub fn run<T>(&self, op: impl FnMut(u32) -> Result<T, InputError>) -> Result<T, InputError> {
        self.run_with(op, std::thread::sleep)
    }
}
