//! Retry/backoff settings for calls to the completion service.

use serde::{Deserialize, Serialize};

/// One entry of the backoff schedule, in units of [`RetryConfig::unit_ms`].
///
/// The delay before the retry is `base_units + U(0, jitter_units)`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackoffStep {
    pub base_units: u32,
    pub jitter_units: u32,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_unit_ms() -> u64 {
    1000
}

fn default_schedule() -> Vec<BackoffStep> {
    vec![
        BackoffStep {
            base_units: 2,
            jitter_units: 2,
        },
        BackoffStep {
            base_units: 6,
            jitter_units: 4,
        },
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Length of one backoff unit in milliseconds.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,

    /// Backoff per retry. Retries past the end reuse the last step.
    #[serde(default = "default_schedule")]
    pub schedule: Vec<BackoffStep>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            unit_ms: default_unit_ms(),
            schedule: default_schedule(),
        }
    }
}
