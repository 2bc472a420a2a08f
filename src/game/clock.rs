//! Three mutually exclusive timers: one per seat plus the system clock.
//!
//! The bank is passive. It never fires callbacks; the turn machine decides
//! when an exhausted clock becomes a timeout, after stopping the timer, so
//! every elapsed interval is accounted to exactly one timer.

use actix_rt::time::Instant;
use chess::Color;
use std::fmt;
use std::time::Duration;

/// One of the three timers in a [`ClockBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    Player(Color),
    System,
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timer::Player(Color::White) => f.write_str("white"),
            Timer::Player(Color::Black) => f.write_str("black"),
            Timer::System => f.write_str("system"),
        }
    }
}

/// Misuse of the bank. These are programming errors in the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("cannot start {requested} clock while {running} clock is running")]
    AlreadyRunning { requested: Timer, running: Timer },

    #[error("cannot stop {requested} clock: it is not running")]
    NotRunning { requested: Timer },

    #[error("cannot credit {color:?} while its clock is running")]
    CreditWhileRunning { color: Color },
}

/// Point-in-time reading of all three timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white: Duration,
    pub black: Duration,
    pub system: Duration,
    pub running: Option<Timer>,
}

impl ClockSnapshot {
    pub fn remaining(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockBank {
    white_remaining: Duration,
    black_remaining: Duration,
    system_elapsed: Duration,
    running: Option<(Timer, Instant)>,
}

impl ClockBank {
    /// Both seats start with `allotment`; the system clock starts at zero.
    pub fn new(allotment: Duration) -> Self {
        Self::with_allotments(allotment, allotment)
    }

    pub fn with_allotments(white: Duration, black: Duration) -> Self {
        Self {
            white_remaining: white,
            black_remaining: black,
            system_elapsed: Duration::ZERO,
            running: None,
        }
    }

    pub fn running(&self) -> Option<Timer> {
        self.running.map(|(timer, _)| timer)
    }

    pub fn start(&mut self, which: Timer, now: Instant) -> Result<(), ClockError> {
        if let Some((running, _)) = self.running {
            return Err(ClockError::AlreadyRunning {
                requested: which,
                running,
            });
        }
        self.running = Some((which, now));
        Ok(())
    }

    /// Stop `which` and charge the elapsed time to it.
    pub fn stop(&mut self, which: Timer, now: Instant) -> Result<Duration, ClockError> {
        let started = match self.running {
            Some((running, started)) if running == which => started,
            _ => return Err(ClockError::NotRunning { requested: which }),
        };
        let elapsed = now.saturating_duration_since(started);
        self.running = None;

        match which {
            Timer::Player(Color::White) => {
                self.white_remaining = self.white_remaining.saturating_sub(elapsed)
            }
            Timer::Player(Color::Black) => {
                self.black_remaining = self.black_remaining.saturating_sub(elapsed)
            }
            Timer::System => self.system_elapsed = self.system_elapsed.saturating_add(elapsed),
        }
        Ok(elapsed)
    }

    /// Stop whichever timer is running, if any.
    pub fn stop_any(&mut self, now: Instant) -> Option<(Timer, Duration)> {
        let timer = self.running()?;
        self.stop(timer, now).ok().map(|elapsed| (timer, elapsed))
    }

    /// Add a per-move increment to a stopped seat clock.
    pub fn credit(&mut self, color: Color, increment: Duration) -> Result<(), ClockError> {
        if self.running() == Some(Timer::Player(color)) {
            return Err(ClockError::CreditWhileRunning { color });
        }
        match color {
            Color::White => self.white_remaining = self.white_remaining.saturating_add(increment),
            Color::Black => self.black_remaining = self.black_remaining.saturating_add(increment),
        }
        Ok(())
    }

    fn running_for(&self, timer: Timer, now: Instant) -> Duration {
        match self.running {
            Some((running, started)) if running == timer => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    pub fn remaining(&self, color: Color, now: Instant) -> Duration {
        let banked = match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        };
        banked.saturating_sub(self.running_for(Timer::Player(color), now))
    }

    pub fn system_elapsed(&self, now: Instant) -> Duration {
        self.system_elapsed
            .saturating_add(self.running_for(Timer::System, now))
    }

    pub fn is_exhausted(&self, color: Color, now: Instant) -> bool {
        self.remaining(color, now).is_zero()
    }

    pub fn snapshot(&self, now: Instant) -> ClockSnapshot {
        ClockSnapshot {
            white: self.remaining(Color::White, now),
            black: self.remaining(Color::Black, now),
            system: self.system_elapsed(now),
            running: self.running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn only_one_timer_runs_at_a_time() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        bank.start(Timer::Player(Color::White), t0).unwrap();

        let err = bank.start(Timer::System, t0).unwrap_err();
        assert_eq!(
            err,
            ClockError::AlreadyRunning {
                requested: Timer::System,
                running: Timer::Player(Color::White),
            }
        );
        assert_eq!(bank.running(), Some(Timer::Player(Color::White)));
    }

    #[test]
    fn stop_requires_the_running_timer() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        assert_eq!(
            bank.stop(Timer::System, t0),
            Err(ClockError::NotRunning {
                requested: Timer::System
            })
        );

        bank.start(Timer::Player(Color::Black), t0).unwrap();
        assert!(bank.stop(Timer::Player(Color::White), t0).is_err());
        assert_eq!(bank.running(), Some(Timer::Player(Color::Black)));
    }

    #[test]
    fn player_time_drains_while_running_and_freezes_when_stopped() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        bank.start(Timer::Player(Color::White), t0).unwrap();

        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(bank.remaining(Color::White, t1), Duration::from_secs(50));
        assert_eq!(bank.remaining(Color::Black, t1), MINUTE);

        let elapsed = bank.stop(Timer::Player(Color::White), t1).unwrap();
        assert_eq!(elapsed, Duration::from_secs(10));

        let t2 = t1 + Duration::from_secs(30);
        assert_eq!(bank.remaining(Color::White, t2), Duration::from_secs(50));
    }

    #[test]
    fn system_time_accumulates() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        bank.start(Timer::System, t0).unwrap();
        bank.stop(Timer::System, t0 + Duration::from_millis(300)).unwrap();
        bank.start(Timer::System, t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(
            bank.system_elapsed(t0 + Duration::from_millis(1200)),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(Duration::from_secs(1));
        bank.start(Timer::Player(Color::Black), t0).unwrap();

        let late = t0 + Duration::from_secs(5);
        assert!(bank.is_exhausted(Color::Black, late));
        assert_eq!(
            bank.stop(Timer::Player(Color::Black), late).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(bank.remaining(Color::Black, late), Duration::ZERO);
    }

    #[test]
    fn credit_is_refused_on_a_running_clock() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        bank.credit(Color::White, Duration::from_secs(2)).unwrap();
        assert_eq!(bank.remaining(Color::White, t0), MINUTE + Duration::from_secs(2));

        bank.start(Timer::Player(Color::White), t0).unwrap();
        assert!(bank.credit(Color::White, Duration::from_secs(2)).is_err());
    }

    #[test]
    fn credit_saturates_instead_of_overflowing() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(Duration::MAX);
        bank.credit(Color::Black, Duration::MAX).unwrap();
        assert_eq!(bank.remaining(Color::Black, t0), Duration::MAX);
    }

    #[test]
    fn snapshot_reports_live_values() {
        let t0 = Instant::now();
        let mut bank = ClockBank::new(MINUTE);
        bank.start(Timer::System, t0).unwrap();
        let snapshot = bank.snapshot(t0 + Duration::from_secs(3));
        assert_eq!(snapshot.system, Duration::from_secs(3));
        assert_eq!(snapshot.white, MINUTE);
        assert_eq!(snapshot.running, Some(Timer::System));

        assert_eq!(
            bank.stop_any(t0 + Duration::from_secs(4)),
            Some((Timer::System, Duration::from_secs(4)))
        );
        assert_eq!(bank.running(), None);
    }
}
