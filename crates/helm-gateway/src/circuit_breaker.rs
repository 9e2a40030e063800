use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use helm_types::config::GatewayConfig;

/// Three-state breaker: `Closed` flows requests, `Open` blocks them,
/// `HalfOpen` probes recovery with a bounded number of trial requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// One breaker per provider id. Internally synchronized so callers never
/// need external locking around `allow_request`/`record_success`/`record_failure`.
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    half_open_max_requests: u32,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    half_open_requests: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_threshold: config.circuit_failure_threshold,
            success_threshold: config.circuit_success_threshold,
            reset_timeout: Duration::from_secs(config.circuit_reset_timeout_secs),
            half_open_max_requests: config.circuit_half_open_max_requests,
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_requests: AtomicU32::new(0),
            opened_at: RwLock::new(None),
        }
    }

    fn check_timeout(&self) {
        let should_probe = {
            let state = *self.state.read().unwrap();
            state == CircuitState::Open
                && self
                    .opened_at
                    .read()
                    .unwrap()
                    .map(|t| t.elapsed() >= self.reset_timeout)
                    .unwrap_or(false)
        };
        if should_probe {
            let mut state = self.state.write().unwrap();
            if *state == CircuitState::Open {
                *state = CircuitState::HalfOpen;
                self.half_open_requests.store(0, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                tracing::info!("circuit breaker probing recovery (half-open)");
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.check_timeout();
        *self.state.read().unwrap()
    }

    pub fn allow_request(&self) -> bool {
        self.check_timeout();
        match *self.state.read().unwrap() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let current = self.half_open_requests.fetch_add(1, Ordering::SeqCst);
                current < self.half_open_max_requests
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.success_threshold {
                    *state = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::SeqCst);
                    tracing::info!("circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.failure_threshold {
                    *state = CircuitState::Open;
                    *self.opened_at.write().unwrap() = Some(Instant::now());
                    tracing::warn!(failures, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.write().unwrap() = Some(Instant::now());
                tracing::warn!("circuit breaker re-opened after half-open failure");
            }
            CircuitState::Open => {}
        }
    }
}

/// One breaker per provider id, created lazily on first use.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    config: GatewayConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    pub fn allow_request(&self, provider_id: &str) -> bool {
        self.breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(&self.config))
            .allow_request()
    }

    pub fn record_success(&self, provider_id: &str) {
        self.breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(&self.config))
            .record_success();
    }

    pub fn record_failure(&self, provider_id: &str) {
        self.breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(&self.config))
            .record_failure();
    }

    pub fn state(&self, provider_id: &str) -> CircuitState {
        self.breakers
            .entry(provider_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(&self.config))
            .state()
    }
}
