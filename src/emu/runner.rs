use std::time::{Duration, Instant};

use super::{Chip8, Chip8Error, Chip8Result, TimerDriver};
use crate::u4;

pub const DEFAULT_CPU_HZ: u32 = 500;

/// Monotonic time source for the scheduler.
pub trait Clock {
    /// Time elapsed since some fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time since the clock was created.
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// High-level emulator runner that manages timing internally.
///
/// Each tick services the 60Hz timers and then runs exactly one instruction.
/// Ticks are gated on wall-clock time at a fixed instruction rate; time lost
/// to a slow host is never made up with extra ticks.
pub struct Chip8Runner<C: Clock = WallClock> {
    chip8: Chip8,
    timer: TimerDriver,
    clock: C,
    cycle_period: Duration,
    last_tick: Duration,
    last_timer_check: Duration,
}

impl Chip8Runner<WallClock> {
    pub fn new(chip8: Chip8) -> Self {
        Self::with_clock(chip8, WallClock::new(), DEFAULT_CPU_HZ)
    }

    pub fn with_cpu_hz(chip8: Chip8, cpu_hz: u32) -> Self {
        Self::with_clock(chip8, WallClock::new(), cpu_hz)
    }
}

impl<C: Clock> Chip8Runner<C> {
    pub fn with_clock(chip8: Chip8, clock: C, cpu_hz: u32) -> Self {
        let now = clock.now();
        Self {
            chip8,
            timer: TimerDriver::new(),
            clock,
            cycle_period: Duration::from_secs(1) / cpu_hz.max(1),
            last_tick: now,
            last_timer_check: now,
        }
    }

    /// Runs one cycle if a full instruction period has passed since the last one.
    ///
    /// Returns `None` when the cycle is not due yet.
    pub fn poll(&mut self) -> Result<Option<Chip8Result>, Chip8Error> {
        let now = self.clock.now();
        if now.saturating_sub(self.last_tick) < self.cycle_period {
            return Ok(None);
        }

        self.tick().map(Some)
    }

    /// Advances the machine by one cycle: timers first, then one instruction.
    pub fn tick(&mut self) -> Result<Chip8Result, Chip8Error> {
        let now = self.clock.now();
        self.last_tick = now;

        let elapsed = now.saturating_sub(self.last_timer_check);
        self.last_timer_check = now;
        self.timer.advance(elapsed, &mut self.chip8);

        self.chip8.cpu_cycle()
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.chip8.get_display_pixel(y, x)
    }

    pub fn cycle_period(&self) -> Duration {
        self.cycle_period
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}
