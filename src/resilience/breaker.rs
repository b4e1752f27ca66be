//! Per-dependency circuit breakers.
//!
//! Tracks call outcomes in a rolling window and gates calls to unhealthy
//! dependencies so one slow collaborator cannot cascade across every
//! in-flight filing. All state lives behind a registry; call sites never
//! touch breaker internals directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use super::Dependency;
use crate::config::BreakerPolicy;
use crate::events::{EventKind, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls short-circuit to the dependency's fallback.
    Open,
    /// One probe call is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Admission decision for one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow { probe: bool },
    ShortCircuit,
}

struct BreakerInner {
    state: CircuitState,
    /// (when, succeeded) per recorded outcome, pruned to the rolling window.
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Breaker for a single dependency. O(1) checks under one mutex; contention
/// is bounded because the critical sections never block on I/O.
pub struct CircuitBreaker {
    dependency: Dependency,
    policy: BreakerPolicy,
    sink: Arc<dyn EventSink>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(dependency: Dependency, policy: BreakerPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            dependency,
            policy,
            sink,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.roll_cooldown(&mut inner);
        inner.state
    }

    /// Decide whether a call attempt may proceed.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.lock();
        self.roll_cooldown(&mut inner);
        match inner.state {
            CircuitState::Closed => Admission::Allow { probe: false },
            CircuitState::Open => Admission::ShortCircuit,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::ShortCircuit
                } else {
                    inner.probe_in_flight = true;
                    Admission::Allow { probe: true }
                }
            }
        }
    }

    pub fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
            inner.outcomes.clear();
            inner.opened_at = None;
            self.transition(&mut inner, CircuitState::Closed);
            return;
        }
        let now = Instant::now();
        inner.outcomes.push_back((now, true));
        self.prune(&mut inner, now);
    }

    pub fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, CircuitState::Open);
            return;
        }
        let now = Instant::now();
        inner.outcomes.push_back((now, false));
        self.prune(&mut inner, now);

        if inner.state == CircuitState::Closed && self.rate_exceeded(&inner) {
            inner.opened_at = Some(now);
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn rate_exceeded(&self, inner: &BreakerInner) -> bool {
        let samples = inner.outcomes.len();
        if samples < self.policy.min_samples {
            return false;
        }
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
        (failures as f64 / samples as f64) > self.policy.failure_threshold
    }

    fn prune(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(&(at, _)) = inner.outcomes.front() {
            if now.duration_since(at) > self.policy.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    /// Open → HalfOpen once the cooldown has elapsed.
    fn roll_cooldown(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| at.elapsed() >= self.policy.cooldown)
            .unwrap_or(true);
        if elapsed {
            inner.probe_in_flight = false;
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.sink.log_event(
            EventKind::BreakerTransition,
            "breaker",
            &format!("{}: {} -> {}", self.dependency, from, to),
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned breaker mutex means a panic mid-update; the window
        // contents are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ═══════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════

/// Process-wide breaker registry keyed by dependency. The only way call
/// sites reach breaker state.
pub struct BreakerRegistry {
    policy: BreakerPolicy,
    sink: Arc<dyn EventSink>,
    breakers: Mutex<HashMap<Dependency, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(policy: BreakerPolicy, sink: Arc<dyn EventSink>) -> Self {
        Self {
            policy,
            sink,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, dependency: Dependency) -> Arc<CircuitBreaker> {
        let mut map = self
            .breakers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        map.entry(dependency)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    dependency,
                    self.policy.clone(),
                    self.sink.clone(),
                ))
            })
            .clone()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::MemoryEventSink;

    fn fast_policy() -> BreakerPolicy {
        BreakerPolicy {
            window: Duration::from_secs(300),
            failure_threshold: 0.5,
            min_samples: 4,
            cooldown: Duration::from_millis(20),
        }
    }

    fn breaker_with_sink() -> (CircuitBreaker, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let breaker = CircuitBreaker::new(Dependency::CaseRecords, fast_policy(), sink.clone());
        (breaker, sink)
    }

    #[test]
    fn stays_closed_below_min_samples() {
        let (breaker, _) = breaker_with_sink();
        // Three straight failures: under the sample floor, still closed.
        for _ in 0..3 {
            breaker.record_failure(false);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.try_acquire(), Admission::Allow { probe: false });
    }

    #[test]
    fn opens_at_four_of_six_failures() {
        // 6 calls, 4 failing (66% > 50%) with min sample met: breaker opens
        // and the next call short-circuits.
        let (breaker, sink) = breaker_with_sink();
        breaker.record_success(false);
        breaker.record_success(false);
        for _ in 0..4 {
            breaker.record_failure(false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire(), Admission::ShortCircuit);

        let transitions = sink.events_of_kind(EventKind::BreakerTransition);
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].detail.contains("closed -> open"));
    }

    #[test]
    fn half_open_after_cooldown_allows_single_probe() {
        let (breaker, _) = breaker_with_sink();
        breaker.record_success(false);
        breaker.record_success(false);
        for _ in 0..4 {
            breaker.record_failure(false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.try_acquire(), Admission::Allow { probe: true });
        // Second caller while the probe is in flight is short-circuited.
        assert_eq!(breaker.try_acquire(), Admission::ShortCircuit);
    }

    #[test]
    fn probe_success_closes_and_resets_counters() {
        let (breaker, _) = breaker_with_sink();
        breaker.record_success(false);
        breaker.record_success(false);
        for _ in 0..4 {
            breaker.record_failure(false);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.try_acquire(), Admission::Allow { probe: true });
        breaker.record_success(true);
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Window was reset: one new failure does not re-open.
        breaker.record_failure(false);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn probe_failure_reopens_with_fresh_cooldown() {
        let (breaker, sink) = breaker_with_sink();
        breaker.record_success(false);
        breaker.record_success(false);
        for _ in 0..4 {
            breaker.record_failure(false);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.try_acquire(), Admission::Allow { probe: true });
        breaker.record_failure(true);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire(), Admission::ShortCircuit);

        let transitions = sink.events_of_kind(EventKind::BreakerTransition);
        // closed -> open, open -> half_open, half_open -> open
        assert_eq!(transitions.len(), 3);
    }

    #[test]
    fn registry_returns_one_breaker_per_dependency() {
        let sink: Arc<MemoryEventSink> = Arc::new(MemoryEventSink::new());
        let registry = BreakerRegistry::new(fast_policy(), sink);
        let a = registry.breaker(Dependency::Translation);
        let b = registry.breaker(Dependency::Translation);
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.breaker(Dependency::CitationLookup);
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
