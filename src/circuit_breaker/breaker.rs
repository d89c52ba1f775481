use super::guard::SingleFlight;
use super::types::{BreakerConfig, BreakerSnapshot, Decision, Thresholds};
use crate::coordination::{LocalMetrics, MetricsAggregator, SUCCESS_METRIC, TOTAL_METRIC};
use crate::metrics;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Error-rate circuit breaker for one service.
///
/// Every call routed through [`CircuitBreaker::before`] counts as an attempt; only
/// successes are reported back. Once per evaluation window the failure rate since the
/// last baseline is compared to the threshold. A tripped breaker rejects calls and, after
/// a growing backoff, lets a single probe through. Any success re-arms the baseline.
///
/// All state lives in atomics. Readers may observe a torn view across fields (for
/// example attempts incremented by another caller between two loads); the rate
/// computation tolerates that skew.
pub struct CircuitBreaker {
    config: BreakerConfig,
    /// Service identity, used in logs and metric labels
    service: String,
    /// Reference point for the millisecond timestamps below
    origin: Instant,

    attempts: AtomicI64,
    successes: AtomicI64,
    baseline_attempts: AtomicI64,
    baseline_successes: AtomicI64,
    backoff_exponent: AtomicU32,

    window_start_ms: AtomicU64,
    last_evaluation_ms: AtomicU64,
    last_upload_ms: AtomicU64,

    upload_guard: SingleFlight,
    probe_guard: SingleFlight,

    local_metrics: LocalMetrics,
    aggregator: Option<MetricsAggregator>,

    rejected_calls: AtomicU64,
    probe_calls: AtomicU64,
    uploads: AtomicU64,
    upload_failures: AtomicU64,
}

/// Outcome of [`CircuitBreaker::before`]
#[derive(Debug)]
pub enum Admission<'a> {
    /// Breaker is open; the real target must not be called
    Rejected,
    /// Real call may proceed; its outcome must be reported through the permit
    Admitted(CallPermit<'a>),
}

impl Admission<'_> {
    pub fn decision(&self) -> Decision {
        match self {
            Admission::Rejected => Decision::Open,
            Admission::Admitted(permit) => permit.decision(),
        }
    }
}

/// Handle for one admitted call. Consumed by exactly one of
/// [`record_success`](CallPermit::record_success) or
/// [`record_failure`](CallPermit::record_failure); dropping it unreported counts as a
/// failure.
#[must_use = "report the call outcome with record_success or record_failure"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    decision: Decision,
    reported: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, decision: Decision) -> Self {
        Self {
            breaker,
            decision,
            reported: false,
        }
    }

    /// `Closed` or `Probe`
    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn record_success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.decision);
    }

    pub fn record_failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.decision);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            debug!(
                service = %self.breaker.service,
                decision = %self.decision,
                "Call permit dropped without an outcome, counting as failure"
            );
            self.breaker.on_failure(self.decision);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker. Without an aggregator, uploads only reset the
    /// local counters.
    pub fn new(
        service: impl Into<String>,
        config: BreakerConfig,
        aggregator: Option<MetricsAggregator>,
    ) -> Self {
        let service = service.into();
        info!(
            service = %service,
            evaluation_window_secs = config.evaluation_window_secs,
            upload_interval_secs = config.upload_interval_secs,
            aggregated = aggregator.is_some(),
            "Creating circuit breaker"
        );

        Self {
            backoff_exponent: AtomicU32::new(config.initial_backoff_exponent),
            config,
            service,
            origin: Instant::now(),
            attempts: AtomicI64::new(0),
            successes: AtomicI64::new(0),
            baseline_attempts: AtomicI64::new(0),
            baseline_successes: AtomicI64::new(0),
            window_start_ms: AtomicU64::new(0),
            last_evaluation_ms: AtomicU64::new(0),
            last_upload_ms: AtomicU64::new(0),
            upload_guard: SingleFlight::new(),
            probe_guard: SingleFlight::new(),
            local_metrics: LocalMetrics::new(),
            aggregator,
            rejected_calls: AtomicU64::new(0),
            probe_calls: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Decide how a guarded call is routed.
    ///
    /// May block on the coordination store when the upload interval has elapsed; only
    /// one caller performs that upload.
    pub async fn before(&self, thresholds: Thresholds) -> Admission<'_> {
        let now = self.now_ms();
        let since_evaluation = now.saturating_sub(self.last_evaluation_ms.load(Ordering::Acquire));
        let since_window_start = now.saturating_sub(self.window_start_ms.load(Ordering::Acquire));

        if since_window_start >= self.upload_interval_ms() {
            if let Some(_flight) = self.upload_guard.try_claim() {
                self.upload_and_reset().await;
                self.window_start_ms.store(self.now_ms(), Ordering::Release);
            }
        }

        self.attempts.fetch_add(1, Ordering::AcqRel);

        let decision = if since_evaluation >= self.evaluation_window_ms() {
            self.evaluate(thresholds, since_evaluation)
        } else {
            Decision::Closed
        };

        metrics::record_breaker_decision(&self.service, decision);

        match decision {
            Decision::Open => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                Admission::Rejected
            }
            Decision::Probe => {
                self.probe_calls.fetch_add(1, Ordering::Relaxed);
                Admission::Admitted(CallPermit::new(self, decision))
            }
            Decision::Closed => Admission::Admitted(CallPermit::new(self, decision)),
        }
    }

    fn evaluate(&self, thresholds: Thresholds, since_evaluation: u64) -> Decision {
        let attempts = self.attempts.load(Ordering::Acquire);
        let successes = self.successes.load(Ordering::Acquire);

        // idle period: counters were reset underneath the baselines
        if attempts == 0 && successes == 0 {
            self.baseline_attempts.store(0, Ordering::Release);
            self.baseline_successes.store(0, Ordering::Release);
        }

        // exclude the call in flight
        let new_attempts = attempts - 1;
        let new_successes = successes;

        if thresholds.error_rate != 0.0 {
            let baseline_attempts = self.baseline_attempts.load(Ordering::Acquire);
            let baseline_successes = self.baseline_successes.load(Ordering::Acquire);

            if new_attempts != baseline_attempts {
                let rate = failure_rate(
                    new_successes - baseline_successes,
                    new_attempts - baseline_attempts,
                );

                if rate >= thresholds.error_rate {
                    if self.try_claim_probe(since_evaluation) {
                        return Decision::Probe;
                    }
                    debug!(
                        service = %self.service,
                        failure_rate = rate,
                        threshold = thresholds.error_rate,
                        "Circuit breaker open, rejecting call"
                    );
                    return Decision::Open;
                }
            }
        }

        // the in-flight call belongs to the next window
        self.rearm(self.attempts.load(Ordering::Acquire) - 1);
        Decision::Closed
    }

    /// One caller per backoff step may probe while the breaker is tripped
    fn try_claim_probe(&self, since_evaluation: u64) -> bool {
        let exponent = self.backoff_exponent.load(Ordering::Acquire);
        if since_evaluation < u64::from(exponent) * self.evaluation_window_ms() {
            return false;
        }

        let Some(_probe) = self.probe_guard.try_claim() else {
            return false;
        };

        // another caller may have probed between the load and the claim
        if self
            .backoff_exponent
            .compare_exchange(exponent, exponent + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        info!(
            service = %self.service,
            backoff_exponent = exponent + 1,
            "Circuit breaker admitting probe call"
        );
        true
    }

    fn on_success(&self, decision: Decision) {
        let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
        self.local_metrics.record(SUCCESS_METRIC, successes);

        if decision == Decision::Probe {
            info!(service = %self.service, "Probe call succeeded, circuit breaker closing");
        }

        self.backoff_exponent
            .store(self.config.initial_backoff_exponent, Ordering::Release);
        // the succeeded call is already settled, keep it out of the next window
        self.rearm(self.attempts.load(Ordering::Acquire));
    }

    fn on_failure(&self, decision: Decision) {
        if decision == Decision::Probe {
            info!(service = %self.service, "Probe call failed, circuit breaker stays open");
        }
    }

    /// Start a new evaluation window from the current counters
    fn rearm(&self, baseline_attempts: i64) {
        self.last_evaluation_ms.store(self.now_ms(), Ordering::Release);
        self.baseline_successes
            .store(self.successes.load(Ordering::Acquire), Ordering::Release);
        self.baseline_attempts
            .store(baseline_attempts, Ordering::Release);
    }

    /// Merge local counts into the shared record, then reset them.
    ///
    /// Counters are reset even when the merge fails, so a failed upload loses that
    /// window's counts.
    async fn upload_and_reset(&self) {
        self.local_metrics
            .record(TOTAL_METRIC, self.attempts.load(Ordering::Acquire));
        let local = self.local_metrics.snapshot();

        if let Some(aggregator) = &self.aggregator {
            match aggregator.merge(&local).await {
                Ok(merged) => {
                    self.uploads.fetch_add(1, Ordering::Relaxed);
                    metrics::record_upload(&self.service, true);
                    debug!(
                        service = %self.service,
                        key = %aggregator.key(),
                        merged = ?merged,
                        "Uploaded breaker metrics"
                    );
                }
                Err(e) => {
                    self.upload_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::record_upload(&self.service, false);
                    warn!(
                        service = %self.service,
                        key = %aggregator.key(),
                        error = %e,
                        "Failed to upload breaker metrics, dropping local counts"
                    );
                }
            }
        }

        self.local_metrics.clear();
        self.attempts.store(0, Ordering::Release);
        self.successes.store(0, Ordering::Release);
        self.baseline_attempts.store(0, Ordering::Release);
        self.baseline_successes.store(0, Ordering::Release);

        let now = self.now_ms();
        self.last_upload_ms.store(now, Ordering::Release);
        self.window_start_ms.store(now, Ordering::Release);
    }

    /// Get current counters
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            attempts: self.attempts.load(Ordering::Acquire),
            successes: self.successes.load(Ordering::Acquire),
            baseline_attempts: self.baseline_attempts.load(Ordering::Acquire),
            baseline_successes: self.baseline_successes.load(Ordering::Acquire),
            backoff_exponent: self.backoff_exponent.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            probe_calls: self.probe_calls.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
        }
    }

    /// Time since the last upload attempt, `None` before the first one
    pub fn since_last_upload(&self) -> Option<std::time::Duration> {
        let last = self.last_upload_ms.load(Ordering::Acquire);
        (last != 0).then(|| std::time::Duration::from_millis(self.now_ms().saturating_sub(last)))
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn evaluation_window_ms(&self) -> u64 {
        self.config.evaluation_window_secs * 1000
    }

    fn upload_interval_ms(&self) -> u64 {
        self.config.upload_interval_secs * 1000
    }
}

/// Percentage of failed attempts; `attempts` must be non-zero
fn failure_rate(successes: i64, attempts: i64) -> f64 {
    100.0 - (successes as f64 / attempts as f64) * 100.0
}
