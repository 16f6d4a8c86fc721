use std::time::Duration;

use super::Chip8;

pub const TIMER_HZ: u32 = 60;
/// One 60Hz period.
pub const TIMER_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / TIMER_HZ as u64);

/// Counts the delay and sound timers down at 60Hz of wall-clock time,
/// independent of the instruction rate.
#[derive(Debug, Default)]
pub struct TimerDriver {
    accumulated: Duration,
}

impl TimerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `elapsed` wall time and, once a full period has built up, counts
    /// the timers down by one.
    ///
    /// Fires at most once per call and restarts the period from zero when it
    /// does. Returns whether the timers were updated.
    pub fn advance(&mut self, elapsed: Duration, chip8: &mut Chip8) -> bool {
        self.accumulated += elapsed;
        if self.accumulated < TIMER_PERIOD {
            return false;
        }

        self.accumulated = Duration::ZERO;
        chip8.timers_cycle();
        true
    }
}
