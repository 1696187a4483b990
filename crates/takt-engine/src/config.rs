//! Engine construction parameters.

use std::time::Duration;

use crate::timebase::Timebase;

/// Tunable parameters for `Engine` construction.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Initial tempo in beats per minute
    pub bpm: f64,
    /// Beats in one nominal bar
    pub beats_per_bar: u32,
    /// Capacity hint for per-tick message vectors; steady-state ticks
    /// should never outgrow it
    pub message_capacity: usize,
    /// How often the maintenance worker sweeps when the doorbell
    /// stays silent
    pub maintenance_interval: Duration,
}

impl EngineConfig {
    pub(crate) fn timebase(&self) -> Timebase {
        Timebase::new(self.sample_rate, self.bpm, self.beats_per_bar)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bpm: 120.0,
            beats_per_bar: 4,
            message_capacity: 1024,
            maintenance_interval: Duration::from_millis(100),
        }
    }
}
