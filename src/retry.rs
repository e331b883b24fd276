use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff with proportional jitter.
///
/// One instance covers one logical operation: create it, call [`sleep`]
/// between attempts, and give up once it returns [`MaxRetriesExceeded`].
///
/// [`sleep`]: ExponentialBackoff::sleep
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    jitter_factor: f64,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            jitter_factor: 0.2,
            current_attempt: 0,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next attempt, before jitter.
    pub fn next_delay(&self) -> Duration {
        let factor = 1u32
            .checked_shl(self.current_attempt)
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = apply_jitter(self.next_delay(), self.jitter_factor);

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

fn apply_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = rand::thread_rng().gen_range(-jitter_factor..=jitter_factor);
    delay.mul_f64((1.0 + spread).max(0.0))
}
