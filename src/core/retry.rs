use std::time::Duration;

/// Delays never grow past this, whatever the multiplier says.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

/// Bounded-retry parameters shared by the redirect resolver and any other
/// loop that needs them, instead of ad hoc constants at each call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Fixed inter-attempt delay, no jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay to sleep after the given attempt (1-based). A multiplier at or
    /// below 1.0 behaves as a fixed delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = if self.multiplier <= 1.0 {
            self.initial_delay
        } else {
            let exp = attempt.saturating_sub(1);
            let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp as i32);
            Duration::from_secs_f64(scaled.min(MAX_DELAY.as_secs_f64()))
        };
        if self.jitter {
            // Uniform in [0.5, 1.5) of the base delay.
            let factor = 0.5 + rand::random::<f64>();
            Duration::from_secs_f64((base.as_secs_f64() * factor).min(MAX_DELAY.as_secs_f64()))
        } else {
            base
        }
    }

    /// True once `attempt` attempts have been made.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
