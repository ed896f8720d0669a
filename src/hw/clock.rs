//! Programmable tick clock.
//!
//! Registers:
//! - 0: write sets the interrupt message; read gives the tick count's low word
//! - 1: write sets the config (bit 0 enables interrupt-on-tick); read gives
//!   the tick count's high word
//! - 2: write sets the tick rate in Hz, clamped to 1..=1000; read gives the
//!   config word

use crate::cpu::{CpuError, Word};
use crate::hw::{Device, InterruptLine};
use std::time::Duration;
use web_time::Instant;

/// Hardware id of the clock.
pub const CLOCK_ID: u32 = 0x12d0_b402;

/// Tick rate after power-on.
pub const DEFAULT_RATE_HZ: Word = 60;

const MIN_RATE_HZ: Word = 1;
const MAX_RATE_HZ: Word = 1000;

const CONFIG_INTERRUPT: Word = 0x0001;

#[derive(Debug, Clone)]
pub struct Clock {
    message: Word,
    config: Word,
    rate_hz: Word,
    ticks: u32,
    last_tick: Instant,
}

impl Clock {
    pub fn new(rate_hz: Word) -> Self {
        Self {
            message: 0,
            config: 0,
            rate_hz: rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ),
            ticks: 0,
            last_tick: Instant::now(),
        }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn rate_hz(&self) -> Word {
        self.rate_hz
    }

    pub fn last_tick(&self) -> Instant {
        self.last_tick
    }

    fn interrupt_enabled(&self) -> bool {
        self.config & CONFIG_INTERRUPT != 0
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1) / u32::from(self.rate_hz)
    }

    /// Advance the clock to `now`: at most one tick per call. Returns whether
    /// a tick happened.
    pub fn poll(&mut self, now: Instant, cpu: &mut dyn InterruptLine) -> Result<bool, CpuError> {
        if now.saturating_duration_since(self.last_tick) < self.interval() {
            return Ok(false);
        }

        self.ticks = self.ticks.wrapping_add(1);
        self.last_tick = now;
        tracing::trace!(ticks = self.ticks, "clock tick");

        if self.interrupt_enabled() && self.message != 0 {
            cpu.interrupt(self.message)?;
        }
        Ok(true)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_HZ)
    }
}

impl Device for Clock {
    fn hardware_id(&self) -> u32 {
        CLOCK_ID
    }

    fn name(&self) -> &'static str {
        "clock"
    }

    fn register_count(&self) -> Word {
        3
    }

    fn on_memory_read(&mut self, register: Word) -> Word {
        match register {
            0 => (self.ticks & 0xFFFF) as Word,
            1 => (self.ticks >> 16) as Word,
            2 => self.config,
            _ => 0,
        }
    }

    fn on_memory_write(&mut self, register: Word, value: Word) {
        match register {
            0 => self.message = value,
            1 => self.config = value,
            2 => self.rate_hz = value.clamp(MIN_RATE_HZ, MAX_RATE_HZ),
            _ => {}
        }
    }

    fn update(&mut self, cpu: &mut dyn InterruptLine) -> Result<(), CpuError> {
        self.poll(Instant::now(), cpu)?;
        Ok(())
    }
}
