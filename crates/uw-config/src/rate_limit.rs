//! Sliding-window admission limits per operation class.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WindowConfig {
    /// Requests admitted per window.
    pub limit: u32,
    pub window_secs: u64,
}

const fn default_read() -> WindowConfig {
    WindowConfig {
        limit: 120,
        window_secs: 60,
    }
}

const fn default_write() -> WindowConfig {
    WindowConfig {
        limit: 30,
        window_secs: 60,
    }
}

const fn default_pipeline() -> WindowConfig {
    WindowConfig {
        limit: 5,
        window_secs: 300,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_read")]
    pub read: WindowConfig,

    #[serde(default = "default_write")]
    pub write: WindowConfig,

    /// Pipeline triggers and regenerations.
    #[serde(default = "default_pipeline")]
    pub pipeline: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read: default_read(),
            write: default_write(),
            pipeline: default_pipeline(),
        }
    }
}

impl RateLimitConfig {
    /// Longest configured window, which is also the stale-key sweep interval.
    #[must_use]
    pub fn longest_window_secs(&self) -> u64 {
        self.read
            .window_secs
            .max(self.write.window_secs)
            .max(self.pipeline.window_secs)
    }
}
