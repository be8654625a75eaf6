//! Reconnect delay policy
//!
//! The connection manager never retries on its own. The policy is carried to
//! the transport in [`TransportSettings`](crate::TransportSettings) and the
//! transport asks it for the delay before each attempt.

use std::time::Duration;

/// Delays used by Phoenix-compatible clients before the fallback kicks in
const DEFAULT_SCHEDULE_MS: [u64; 9] = [10, 50, 100, 150, 200, 250, 500, 1000, 2000];

/// Delay once the schedule is exhausted
const DEFAULT_FALLBACK_MS: u64 = 5000;

/// How long to wait before reconnect attempt `n` (1-based)
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Fixed per-attempt schedule, then a constant fallback
    Schedule {
        /// Delay for attempts `1..=steps.len()`
        steps: Vec<Duration>,
        /// Delay for every attempt past the schedule
        fallback: Duration,
    },
    /// Exponential backoff capped at `max`
    Exponential {
        /// Delay for the first attempt
        base: Duration,
        /// Backoff multiplier (e.g., 2.0 for doubling)
        multiplier: f64,
        /// Maximum delay between attempts
        max: Duration,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Schedule {
            steps: DEFAULT_SCHEDULE_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            fallback: Duration::from_millis(DEFAULT_FALLBACK_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Build a schedule policy from millisecond values
    pub fn schedule_ms(steps: &[u64], fallback_ms: u64) -> Self {
        Self::Schedule {
            steps: steps.iter().copied().map(Duration::from_millis).collect(),
            fallback: Duration::from_millis(fallback_ms),
        }
    }

    /// Delay before attempt `tries` (1-based; 0 is treated as 1)
    pub fn delay_for(&self, tries: u32) -> Duration {
        let tries = tries.max(1);
        match self {
            Self::Schedule { steps, fallback } => steps
                .get((tries - 1) as usize)
                .copied()
                .unwrap_or(*fallback),
            Self::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(tries - 1).unwrap_or(i32::MAX);
                let millis = base.as_millis() as f64 * multiplier.powi(exponent);
                if !millis.is_finite() || millis >= max.as_millis() as f64 {
                    *max
                } else {
                    Duration::from_millis(millis as u64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(9), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = ReconnectPolicy::Exponential {
            base: Duration::from_secs(2),
            multiplier: 2.0,
            max: Duration::from_secs(60),
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(2)); // 2 * 2^0
        assert_eq!(policy.delay_for(2), Duration::from_secs(4)); // 2 * 2^1
        assert_eq!(policy.delay_for(3), Duration::from_secs(8)); // 2 * 2^2
        assert_eq!(policy.delay_for(10), Duration::from_secs(60)); // capped
    }
}
