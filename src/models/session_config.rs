use std::time::Duration;

use crate::models::Seats;

/// How orchestration overhead is bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemClockPolicy {
    /// Upper bound for a single retry request; expiry counts as a gateway failure.
    pub retry_timeout: Duration,
    /// Period of `ClockTick` events and clock checks while waiting on an agent.
    pub tick_interval: Duration,
    /// Abort the game after this many committed plies.
    pub max_plies: Option<u32>,
}

impl Default for SystemClockPolicy {
    fn default() -> Self {
        Self {
            retry_timeout: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
            max_plies: Some(400),
        }
    }
}

/// Everything needed to start one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub seats: Seats,
    /// Corrective re-prompts allowed per ply.
    pub retry_budget: u32,
    pub initial_clock: Duration,
    /// Added to a seat's clock after each move it commits.
    pub increment: Duration,
    pub policy: SystemClockPolicy,
}

impl SessionConfig {
    pub fn new(seats: Seats) -> Self {
        Self {
            seats,
            retry_budget: 2,
            initial_clock: Duration::from_secs(600),
            increment: Duration::ZERO,
            policy: SystemClockPolicy::default(),
        }
    }
}
