//! Per-service circuit breaker.
//!
//! Counts consecutive failures; at the threshold the breaker opens
//! and rejects calls without invoking them until the cooldown
//! elapses. After the cooldown the breaker closes optimistically: a
//! failing probe re-opens it and resets the timer, any success fully
//! resets it.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use telemetry::metrics;
use tokio::time::Instant;
use tracing::{debug, warn};

use feed_core::{Error, Result};

/// Breaker tuning for one upstream service.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker trips.
    pub threshold: u32,
    /// How long an open breaker rejects calls.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    failures: u32,
    open: bool,
    last_failure: Option<Instant>,
}

/// One instance per upstream service, shared by all callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: &'static str,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(service: &'static str, config: BreakerConfig) -> Self {
        Self {
            service,
            config,
            state: Mutex::new(BreakerState {
                failures: 0,
                open: false,
                last_failure: None,
            }),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Runs `op`, or fails fast with `Error::BreakerOpen` without
    /// invoking it while the breaker is open.
    pub async fn call<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.preflight()?;

        match op.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Manual reset, exposed to the admin surface.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failures = 0;
        state.open = false;
        state.last_failure = None;
        self.mirror_gauge(false);
        debug!(service = self.service, "circuit breaker reset");
    }

    fn mirror_gauge(&self, open: bool) {
        if let Some(gauge) = metrics().breaker_open(self.service) {
            gauge.set(open as u64);
        }
    }

    fn preflight(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Ok(());
        }

        let cooling = state
            .last_failure
            .is_some_and(|at| at.elapsed() < self.config.cooldown);
        if cooling {
            metrics().breaker_rejections.inc();
            return Err(Error::BreakerOpen {
                service: self.service,
            });
        }

        // Cooldown elapsed: close optimistically. The failure count
        // stays at the threshold so a failing probe re-opens at once.
        state.open = false;
        self.mirror_gauge(false);
        debug!(service = self.service, "breaker cooldown elapsed, probing");
        Ok(())
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        state.failures = 0;
        state.open = false;
        self.mirror_gauge(false);
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        state.failures += 1;
        state.last_failure = Some(Instant::now());
        if state.failures >= self.config.threshold && !state.open {
            state.open = true;
            self.mirror_gauge(true);
            warn!(
                service = self.service,
                failures = state.failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "circuit breaker opened"
            );
        }
    }
}
