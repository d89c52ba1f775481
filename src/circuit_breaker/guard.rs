use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const CLAIMED: u8 = 1;

/// At-most-one-claimant flag
#[derive(Debug, Default)]
pub struct SingleFlight {
    state: AtomicU8,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag if idle. The returned guard releases it when dropped.
    pub fn try_claim(&self) -> Option<FlightGuard<'_>> {
        self.state
            .compare_exchange(IDLE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    pub fn is_claimed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLAIMED
    }
}

/// Scoped claim on a [`SingleFlight`]
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.state.store(IDLE, Ordering::Release);
    }
}
