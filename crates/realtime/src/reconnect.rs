//! Retry policies for establishing the stream connection.
//!
//! A policy is only consulted while the connection is being opened. Once a
//! stream is live, a transport error ends it; whether the session should then
//! be recreated is the owner's decision.

use crate::StreamError;
use std::time::Duration;

pub trait ReconnectPolicy: Send + Sync {
    /// Delay before connection attempt `attempt + 1`, or `None` to give up.
    /// `attempt` counts the attempts made so far, starting at 1.
    fn next_delay(&self, attempt: u32, error: &StreamError) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32, _error: &StreamError) -> Option<Duration> {
        None
    }
}

/// Doubles the delay after each failed transport-level attempt.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, error: &StreamError) -> Option<Duration> {
        if !error.is_transport() || attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.initial.saturating_mul(factor).min(self.max_delay))
    }
}
