//! Sliding-window admission control.
//!
//! Each [`OperationClass`] has its own window, counted per caller key.
//! Rejection happens before any pipeline work. Keys with no hits inside
//! their window are swept on an interval equal to the longest configured
//! window, so memory stays proportional to active callers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uw_config::{RateLimitConfig, WindowConfig};
use uw_core::enums::OperationClass;

/// Time source for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}

/// A request refused by its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub class: OperationClass,
    pub limit: u32,
    /// Time until the oldest counted hit leaves the window.
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Window {
    limit: u32,
    span: Duration,
    hits: HashMap<String, VecDeque<Instant>>,
}

impl Window {
    fn new(config: WindowConfig) -> Self {
        Self {
            limit: config.limit,
            span: Duration::from_secs(config.window_secs),
            hits: HashMap::new(),
        }
    }

    fn prune(hits: &mut VecDeque<Instant>, span: Duration, now: Instant) {
        while hits
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= span)
        {
            hits.pop_front();
        }
    }

    fn admit(&mut self, key: &str, now: Instant) -> Result<(), Duration> {
        let span = self.span;
        let hits = self.hits.entry(key.to_string()).or_default();
        Self::prune(hits, span, now);
        if hits.len() >= self.limit as usize {
            let wait = hits
                .front()
                .map_or(span, |t| span.saturating_sub(now.saturating_duration_since(*t)));
            return Err(wait);
        }
        hits.push_back(now);
        Ok(())
    }

    /// Drop keys with no hits left in the window. Returns how many went.
    fn sweep(&mut self, now: Instant) -> usize {
        let span = self.span;
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
            Self::prune(hits, span, now);
            !hits.is_empty()
        });
        before - self.hits.len()
    }
}

/// Per-class, per-caller sliding-window limiter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    read: Mutex<Window>,
    write: Mutex<Window>,
    pipeline: Mutex<Window>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked_keys", &self.tracked_keys())
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            read: Mutex::new(Window::new(config.read)),
            write: Mutex::new(Window::new(config.write)),
            pipeline: Mutex::new(Window::new(config.pipeline)),
            sweep_interval: Duration::from_secs(config.longest_window_secs()),
            last_sweep: Mutex::new(now),
            clock,
        }
    }

    const fn window(&self, class: OperationClass) -> &Mutex<Window> {
        match class {
            OperationClass::Read => &self.read,
            OperationClass::Write => &self.write,
            OperationClass::Pipeline => &self.pipeline,
        }
    }

    /// Count one request of `class` for `key`, or refuse it.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the caller's window is full. A refused
    /// request is not counted.
    pub fn check(&self, class: OperationClass, key: &str) -> Result<(), Rejection> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let mut window = self.window(class).lock();
        window.admit(key, now).map_err(|retry_after| {
            tracing::debug!(%class, key, limit = window.limit, "request rate limited");
            Rejection {
                class,
                limit: window.limit,
                retry_after,
            }
        })
    }

    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock();
            if now.saturating_duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        let evicted: usize = [&self.read, &self.write, &self.pipeline]
            .iter()
            .map(|w| w.lock().sweep(now))
            .sum();
        if evicted > 0 {
            tracing::debug!(evicted, "stale rate-limit keys swept");
        }
    }

    /// Keys currently holding counters, across all classes.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        [&self.read, &self.write, &self.pipeline]
            .iter()
            .map(|w| w.lock().hits.len())
            .sum()
    }
}
