use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// Reconnect delay bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_cap_ms")]
    pub cap_ms: u64,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
            cap_ms: u64::try_from(cap.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    #[must_use]
    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.base_ms == 0 {
            return Err(FeedError::Configuration(
                "backoff base delay must be > 0".to_owned(),
            ));
        }
        if self.cap_ms < self.base_ms {
            return Err(FeedError::Configuration(format!(
                "backoff cap ({} ms) must be >= base ({} ms)",
                self.cap_ms, self.base_ms
            )));
        }
        Ok(())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            cap_ms: default_cap_ms(),
        }
    }
}

/// Capped exponential reconnect delay.
///
/// Successive calls to [`next_delay`](Self::next_delay) yield base, 2x base,
/// 4x base, ... and then stay at the cap until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    cap: Duration,
    next: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> FeedResult<Self> {
        policy.validate()?;
        Ok(Self {
            base: policy.base(),
            cap: policy.cap(),
            next: policy.base(),
            failures: 0,
        })
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.cap);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Delay the next call to `next_delay` will return.
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = self.base;
        self.failures = 0;
    }

    /// Consecutive delays handed out since the last reset.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

fn default_base_ms() -> u64 {
    1_000
}

fn default_cap_ms() -> u64 {
    8_000
}
