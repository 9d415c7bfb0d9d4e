//! Poll attempt schedule.
//!
//! Linear ramp bounded above: `delay(attempt) = min(base + attempt * step, max)`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling schedule and ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before the second fetch.
    pub base_delay_ms: u64,
    /// Added per attempt.
    pub step_ms: u64,
    /// Hard cap on any delay.
    pub max_delay_ms: u64,
    /// Fallback delay after a transient fetch failure.
    pub error_delay_ms: u64,
    /// Give up after this many fetches. `None` polls until a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            step_ms: 500,
            max_delay_ms: 8_000,
            error_delay_ms: 4_000,
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay after the `attempt`-th (0-indexed) successful non-terminal fetch.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ramp = self
            .base_delay_ms
            .saturating_add(u64::from(attempt).saturating_mul(self.step_ms));
        Duration::from_millis(ramp.min(self.max_delay_ms))
    }

    /// Delay after the `attempt`-th fetch failed transiently.
    ///
    /// Never shorter than the regular schedule and never above the cap.
    pub fn error_delay(&self, attempt: u32) -> Duration {
        let regular = self.delay(attempt);
        Duration::from_millis(self.error_delay_ms)
            .max(regular)
            .min(Duration::from_millis(self.max_delay_ms))
    }

    /// Check if `attempts` fetches exhaust the ceiling.
    #[inline]
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn policies() -> impl Strategy<Value = PollPolicy> {
        (0u64..60_000, 0u64..10_000, 1u64..120_000, 0u64..60_000).prop_map(
            |(base_delay_ms, step_ms, max_delay_ms, error_delay_ms)| PollPolicy {
                base_delay_ms,
                step_ms,
                max_delay_ms,
                error_delay_ms,
                max_attempts: None,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_delay_is_monotonic_and_bounded(policy in policies(), attempt in 0u32..100_000) {
            let current = policy.delay(attempt);
            let next = policy.delay(attempt + 1);
            prop_assert!(current <= next, "delay must be non-decreasing");
            prop_assert!(next <= Duration::from_millis(policy.max_delay_ms), "delay must respect the cap");
        }

        #[test]
        fn prop_error_delay_never_undercuts_schedule(policy in policies(), attempt in 0u32..100_000) {
            let error = policy.error_delay(attempt);
            prop_assert!(error >= policy.delay(attempt));
            prop_assert!(error <= Duration::from_millis(policy.max_delay_ms));
        }
    }
}
