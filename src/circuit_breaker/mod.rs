pub mod breaker;
pub mod guard;
pub mod types;

pub use breaker::{Admission, CallPermit, CircuitBreaker};
pub use guard::{FlightGuard, SingleFlight};
pub use types::{BreakerConfig, BreakerSnapshot, Decision, Thresholds};
