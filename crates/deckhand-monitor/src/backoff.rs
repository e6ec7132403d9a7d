use std::time::Duration;

/// Reconnect policy applied between live connection attempts.
///
/// Delays double from `base_delay_ms` up to `max_delay_ms`; the attempt
/// counter resets whenever a connection opens successfully.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum failed attempts before the session gives up.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the exponential delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Whether another reconnect may be attempted after `attempts` failures.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before reconnect attempt number `attempt` (zero-based):
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}
