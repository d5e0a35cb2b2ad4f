//! Per-target circuit breaker protecting outbound backend calls.

use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::config::CircuitBreakerConfig;
use crate::error::{OrchestratorError, Result};
use crate::types::{CircuitState, CircuitStateKind};

struct TargetState {
    kind: CircuitStateKind,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            kind: CircuitStateKind::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: RwLock<HashMap<String, TargetState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Runs `f` under the breaker for `target`. Fails fast with `CircuitOpen`
    /// when the target's circuit has not yet timed out into half-open.
    pub async fn call<F, Fut, T>(&self, target: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit(target).await?;

        match f().await {
            Ok(value) => {
                self.on_success(target).await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure(target).await;
                Err(err)
            }
        }
    }

    async fn admit(&self, target: &str) -> Result<()> {
        let mut states = self.states.write().await;
        let state = states.entry(target.to_string()).or_default();

        if state.kind == CircuitStateKind::Open {
            let elapsed = state
                .last_failure
                .map(|t| t.elapsed())
                .unwrap_or_default();
            if elapsed > self.config.timeout {
                state.kind = CircuitStateKind::HalfOpen;
                state.consecutive_successes = 0;
                tracing::info!(target, "circuit half-opening after timeout");
            } else {
                return Err(OrchestratorError::CircuitOpen {
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn on_success(&self, target: &str) {
        let mut states = self.states.write().await;
        let state = states.entry(target.to_string()).or_default();

        match state.kind {
            CircuitStateKind::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    state.kind = CircuitStateKind::Closed;
                    state.consecutive_failures = 0;
                    tracing::info!(target, "circuit closed after recovery");
                }
            }
            _ => {
                state.consecutive_failures = 0;
            }
        }
    }

    async fn on_failure(&self, target: &str) {
        let mut states = self.states.write().await;
        let state = states.entry(target.to_string()).or_default();

        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());

        match state.kind {
            CircuitStateKind::HalfOpen => {
                state.kind = CircuitStateKind::Open;
                tracing::warn!(target, "circuit re-opened during half-open probe");
            }
            CircuitStateKind::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                state.kind = CircuitStateKind::Open;
                tracing::warn!(target, failures = state.consecutive_failures, "circuit opened");
            }
            _ => {}
        }
    }

    pub async fn state(&self, target: &str) -> CircuitState {
        let states = self.states.read().await;
        match states.get(target) {
            Some(s) => CircuitState {
                state: s.kind,
                consecutive_failures: s.consecutive_failures,
                consecutive_successes: s.consecutive_successes,
                last_failure: s.last_failure.map(|_| std::time::SystemTime::now()),
            },
            None => CircuitState::default(),
        }
    }

    pub async fn all_states(&self) -> HashMap<String, CircuitState> {
        let states = self.states.read().await;
        states
            .iter()
            .map(|(k, s)| {
                (
                    k.clone(),
                    CircuitState {
                        state: s.kind,
                        consecutive_failures: s.consecutive_failures,
                        consecutive_successes: s.consecutive_successes,
                        last_failure: s.last_failure.map(|_| std::time::SystemTime::now()),
                    },
                )
            })
            .collect()
    }

    pub async fn reset(&self, target: &str) {
        let mut states = self.states.write().await;
        states.insert(target.to_string(), TargetState::default());
        tracing::info!(target, "circuit manually reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            timeout: Duration::from_millis(50),
            success_threshold: 2,
        }
    }

    fn fail() -> Result<()> {
        Err(OrchestratorError::Validation("boom".into()))
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            let _ = breaker.call("svc", || async { fail() }).await;
        }
        let state = breaker.state("svc").await;
        assert_eq!(state.state, CircuitStateKind::Open);
    }

    #[tokio::test]
    async fn fails_fast_while_open() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            let _ = breaker.call("svc", || async { fail() }).await;
        }
        let result = breaker.call("svc", || async { Ok(()) }).await;
        assert!(matches!(result, Err(OrchestratorError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn closes_after_half_open_successes() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            let _ = breaker.call("svc", || async { fail() }).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = breaker.call("svc", || async { Ok::<_, OrchestratorError>(()) }).await;
        let _ = breaker.call("svc", || async { Ok::<_, OrchestratorError>(()) }).await;
        let state = breaker.state("svc").await;
        assert_eq!(state.state, CircuitStateKind::Closed);
    }
}
