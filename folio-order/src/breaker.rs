use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use folio_store::app_config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failure detected, failing fast
    HalfOpen, // Testing if service is back
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Calls that must be observed in a window before the ratio is considered
    pub min_requests: u32,
    pub failure_ratio: f64,
    /// Length of the closed-state measurement window
    pub interval: Duration,
    /// How long the breaker stays open before admitting trial calls
    pub cool_down: Duration,
    /// Trial calls admitted while half-open; this many successes close the breaker
    pub half_open_max_requests: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            min_requests: config.min_requests,
            failure_ratio: config.failure_ratio,
            interval: Duration::from_secs(config.interval_secs),
            cool_down: Duration::from_secs(config.cool_down_secs),
            half_open_max_requests: config.half_open_max_requests.max(1),
        }
    }
}

/// Call outcomes observed in the current generation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

/// Why a call through the breaker did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// Rejected without invoking the dependency
    Open,
    /// Half-open trial budget already in flight
    TooManyRequests,
    Inner(E),
}

struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Closed / open / half-open gate in front of a remote dependency.
///
/// All counter updates for one call outcome happen under a single short
/// critical section, never held across an await point.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, settings: BreakerSettings) -> Self {
        let now = Instant::now();
        let expiry = (!settings.interval.is_zero()).then(|| now + settings.interval);
        Self {
            name: name.to_string(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    /// Run `call` through the gate. `is_failure` decides which errors count
    /// against the dependency; the rest are passed through as healthy
    /// responses. A call dropped before completing counts as a failure.
    pub async fn call<T, E, F, Fut>(
        &self,
        call: F,
        is_failure: impl Fn(&E) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_call::<E>()?;
        let mut guard = OutcomeGuard {
            breaker: self,
            generation,
            settled: false,
        };

        let result = call().await;
        let success = match &result {
            Ok(_) => true,
            Err(e) => !is_failure(e),
        };
        guard.settle(success);

        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn before_call<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Open => Err(BreakerError::Open),
            CircuitState::HalfOpen
                if inner.counts.requests >= self.settings.half_open_max_requests =>
            {
                Err(BreakerError::TooManyRequests)
            }
            _ => {
                inner.counts.on_request();
                Ok(inner.generation)
            }
        }
    }

    fn after_call(&self, generation: u64, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        // Outcome belongs to a window that has already been closed out
        if inner.generation != generation {
            return;
        }

        if success {
            inner.counts.on_success();
            if inner.state == CircuitState::HalfOpen
                && inner.counts.consecutive_successes >= self.settings.half_open_max_requests
            {
                self.set_state(&mut inner, CircuitState::Closed, now);
            }
        } else {
            inner.counts.on_failure();
            match inner.state {
                CircuitState::Closed if self.ready_to_trip(&inner.counts) => {
                    self.set_state(&mut inner, CircuitState::Open, now);
                }
                CircuitState::HalfOpen => {
                    self.set_state(&mut inner, CircuitState::Open, now);
                }
                _ => {}
            }
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.requests < self.settings.min_requests || counts.requests == 0 {
            return false;
        }
        f64::from(counts.failures) / f64::from(counts.requests) >= self.settings.failure_ratio
    }

    /// Apply time-driven transitions: closed windows roll over, open
    /// breakers move to half-open once the cool-down has elapsed.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            CircuitState::Closed if expired => self.new_generation(inner, now),
            CircuitState::Open if expired => self.set_state(inner, CircuitState::HalfOpen, now),
            _ => {}
        }
    }

    fn set_state(&self, inner: &mut Inner, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }
        let previous = inner.state;
        let counts = inner.counts;
        inner.state = state;
        self.new_generation(inner, now);

        match state {
            CircuitState::Open => tracing::error!(
                breaker = %self.name,
                from = ?previous,
                requests = counts.requests,
                failures = counts.failures,
                "Circuit Breaker [{}] TRIPPED to Open",
                self.name
            ),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit Breaker [{}] moving to Half-Open", self.name)
            }
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, "Circuit Breaker [{}] recovered to Closed", self.name)
            }
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed if !self.settings.interval.is_zero() => {
                Some(now + self.settings.interval)
            }
            CircuitState::Closed => None,
            CircuitState::Open => Some(now + self.settings.cool_down),
            CircuitState::HalfOpen => None,
        };
    }
}

/// Records the outcome of an admitted call, or a failure if the call is
/// dropped (deadline, cancellation) before it completes.
struct OutcomeGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl OutcomeGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_call(self.generation, success);
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_call(self.generation, false);
        }
    }
}
