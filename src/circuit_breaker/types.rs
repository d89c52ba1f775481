use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Routing decision for one guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Breaker is tripped, the call goes straight to fallback
    Open,
    /// Real call proceeds normally
    Closed,
    /// Single real call allowed while the breaker is tripped
    Probe,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Open => "open",
            Decision::Closed => "closed",
            Decision::Probe => "probe",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Open => write!(f, "Open"),
            Decision::Closed => write!(f, "Closed"),
            Decision::Probe => write!(f, "Probe"),
        }
    }
}

/// Breaker timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Period over which the failure rate is evaluated
    #[serde(default = "default_evaluation_window_secs")]
    pub evaluation_window_secs: u64,

    /// Period after which local counts are merged into the coordination store
    #[serde(default = "default_upload_interval_secs")]
    pub upload_interval_secs: u64,

    /// Probe backoff multiplier after a success; the probe wait is
    /// `exponent * evaluation_window`
    #[serde(default = "default_initial_backoff_exponent")]
    pub initial_backoff_exponent: u32,
}

fn default_evaluation_window_secs() -> u64 {
    10
}

fn default_upload_interval_secs() -> u64 {
    180
}

fn default_initial_backoff_exponent() -> u32 {
    2
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            evaluation_window_secs: default_evaluation_window_secs(),
            upload_interval_secs: default_upload_interval_secs(),
            initial_backoff_exponent: default_initial_backoff_exponent(),
        }
    }
}

impl BreakerConfig {
    pub fn evaluation_window(&self) -> Duration {
        Duration::from_secs(self.evaluation_window_secs)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }
}

/// Per-method trip parameters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Thresholds {
    /// Failure percentage (0-100) at which the breaker trips; 0 disables the check
    pub error_rate: f64,
    /// Parsed and carried, but it only decides whether the breaker is consulted
    pub concurrency: i64,
}

impl Thresholds {
    /// Parse raw parameter values. Anything that is not a valid number is 0.
    pub fn parse(error_rate: &str, concurrency: &str) -> Self {
        Self {
            error_rate: error_rate
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            concurrency: concurrency.trim().parse::<i64>().unwrap_or(0),
        }
    }

    /// Whether the breaker should be consulted at all
    pub fn is_configured(&self) -> bool {
        self.error_rate != 0.0 || self.concurrency != 0
    }
}

/// Point-in-time view of breaker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Attempts since the last upload
    pub attempts: i64,
    /// Successes since the last upload
    pub successes: i64,
    /// Attempts at the last evaluation boundary
    pub baseline_attempts: i64,
    /// Successes at the last evaluation boundary
    pub baseline_successes: i64,
    /// Current probe backoff multiplier
    pub backoff_exponent: u32,
    /// Calls short-circuited to fallback
    pub rejected_calls: u64,
    /// Probe calls admitted
    pub probe_calls: u64,
    /// Successful merges into the coordination store
    pub uploads: u64,
    /// Failed merges into the coordination store
    pub upload_failures: u64,
}
