//! Tempo and meter expressed in frames.

/// Converts musical time into frame counts.
///
/// One bar is `sample_rate * 60 / bpm * beats_per_bar` frames; every
/// other frame quantity in the engine derives from that.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timebase {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Beats in one nominal bar
    pub beats_per_bar: u32,
}

impl Timebase {
    pub fn new(sample_rate: u32, bpm: f64, beats_per_bar: u32) -> Self {
        Self {
            sample_rate,
            bpm,
            beats_per_bar,
        }
    }

    /// Frame length of one nominal bar at this tempo.
    pub fn bar_length_in_frames(&self) -> i64 {
        let beat = self.sample_rate as f64 * 60.0 / self.bpm;
        (beat * self.beats_per_bar as f64).round() as i64
    }

    /// The same clock and meter at a different tempo.
    pub fn with_bpm(&self, bpm: f64) -> Self {
        Self { bpm, ..*self }
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bpm: 120.0,
            beats_per_bar: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_length_at_common_tempos() {
        let tb = Timebase::new(48_000, 120.0, 4);
        assert_eq!(tb.bar_length_in_frames(), 96_000);

        let tb = Timebase::new(44_100, 140.0, 4);
        assert_eq!(tb.bar_length_in_frames(), 75_600);
    }

    #[test]
    fn meter_scales_bar_length() {
        let waltz = Timebase::new(48_000, 120.0, 3);
        let common = Timebase::new(48_000, 120.0, 4);
        assert_eq!(waltz.bar_length_in_frames() * 4, common.bar_length_in_frames() * 3);
    }

    #[test]
    fn with_bpm_keeps_clock_and_meter() {
        let tb = Timebase::new(48_000, 120.0, 4);
        let faster = tb.with_bpm(150.0);
        assert_eq!(faster.sample_rate, 48_000);
        assert_eq!(faster.beats_per_bar, 4);
        assert_eq!(faster.bar_length_in_frames(), 76_800);
    }
}
