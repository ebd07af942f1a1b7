use super::constants::*;
use super::event::{DetectorType, Ulm};

/// Reconciles the coarse wall clock (seconds) of the MIDAS events with the
/// fine ULM hardware counter (100 ns ticks, 32-bit wraparound) to extend the
/// counter to a monotonic 64-bit value.
///
/// One anchor is kept per detector family: the wall time at which that
/// family's hardware counter was zero. The number of counter wraps since the
/// anchor is estimated from the wall clock and disambiguated against the raw
/// counter with a half-period split. This is a heuristic; rounding
/// discrepancies at the wrap boundary are logged rather than silently
/// adjusted away.
#[derive(Debug, Default)]
pub struct ClockState {
    first_event_time: [Option<f64>; 4],
    nof_stored_cycles: u32,
}

impl ClockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the raw ULM clock with the wrap count since this family's
    /// anchor. The first observation per family only records the anchor.
    pub fn correct_overflow(
        &mut self,
        detector_type: DetectorType,
        event_wall_time: u32,
        ulm: &mut Ulm,
    ) {
        let ticks = ULM_TICKS_PER_SECOND as f64;
        let period = ULM_CLOCK_MODULUS as f64 / ticks;
        let raw_seconds = ulm.clock as f64 / ticks;

        let anchor = &mut self.first_event_time[detector_type.index()];
        let first = match anchor {
            None => {
                *anchor = Some(event_wall_time as f64 - raw_seconds);
                return;
            }
            Some(first) => *first,
        };

        let elapsed = event_wall_time as f64 - first;
        if elapsed < 0.0 {
            spdlog::warn!(
                "{} event wall time {} is before the clock anchor {:.1}",
                detector_type,
                event_wall_time,
                first
            );
            return;
        }

        let mut wraps = (elapsed / period).floor() as u64;
        let phase = elapsed - wraps as f64 * period;
        // The wall clock only has one-second resolution, so near a wrap
        // boundary the tick counter and the wall estimate can disagree by one
        // wrap. Compare both against the half period to pick the direction.
        if phase > period / 2.0 && raw_seconds < period / 2.0 {
            wraps += 1;
        } else if phase < period / 2.0 && raw_seconds > period / 2.0 {
            if wraps == 0 {
                spdlog::warn!(
                    "{} hardware clock ahead of its anchor within the first wrap (phase {:.1} s, counter {:.1} s)",
                    detector_type,
                    phase,
                    raw_seconds
                );
            } else {
                wraps -= 1;
            }
        }

        ulm.set_clock_overflow(wraps as u32);
    }

    /// Called once per end-of-cycle scaler event.
    pub fn update(&mut self, _event_time: u32) {
        self.nof_stored_cycles += 1;
    }

    pub fn nof_stored_cycles(&self) -> u32 {
        self.nof_stored_cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: f64 = ULM_CLOCK_MODULUS as f64 / ULM_TICKS_PER_SECOND as f64; // ~429.5 s

    fn ulm_with_clock(ticks: u64) -> Ulm {
        let mut ulm = Ulm::default();
        ulm.set_clock((ticks % ULM_CLOCK_MODULUS) as u32);
        ulm
    }

    #[test]
    fn test_overflow_monotonic_across_two_wraps() {
        let mut state = ClockState::new();
        let anchor_wall = 1000u32;

        // elapsed seconds relative to the anchor; the hardware counter runs at
        // 10^7 ticks per second and wraps every 2^32 ticks
        let elapsed_seconds = [0u32, 200, 400, 440, 700, 880, 1300];
        let mut last_clock = 0u64;
        for (i, elapsed) in elapsed_seconds.iter().enumerate() {
            let true_ticks = *elapsed as u64 * ULM_TICKS_PER_SECOND;
            let mut ulm = ulm_with_clock(true_ticks);
            state.correct_overflow(
                DetectorType::Germanium,
                anchor_wall + elapsed,
                &mut ulm,
            );
            assert!(
                ulm.clock >= last_clock,
                "clock went backwards at step {}: {} < {}",
                i,
                ulm.clock,
                last_clock
            );
            assert_eq!(ulm.clock, true_ticks, "step {}", i);
            last_clock = ulm.clock;
        }
        // the sequence crossed the wrap boundary twice
        assert!(last_clock > 2 * ULM_CLOCK_MODULUS);
    }

    #[test]
    fn test_half_period_disambiguation() {
        let mut state = ClockState::new();
        // anchor at wall 500 with a zero counter
        let mut ulm = ulm_with_clock(0);
        state.correct_overflow(DetectorType::Plastic, 500, &mut ulm);

        // hardware clock has already wrapped but the whole-period count from
        // the one-second wall clock has not caught up yet
        let wall = 500 + PERIOD as u32; // floor(429.49) = 429 s elapsed, phase just below the period
        let mut ulm = ulm_with_clock(2 * ULM_TICKS_PER_SECOND); // 2 s past the wrap
        state.correct_overflow(DetectorType::Plastic, wall, &mut ulm);
        assert_eq!(ulm.clock >> 32, 1);
    }

    #[test]
    fn test_anchor_per_detector_type() {
        let mut state = ClockState::new();
        let mut ge = ulm_with_clock(1_000_000);
        state.correct_overflow(DetectorType::Germanium, 100, &mut ge);
        // a different family gets its own anchor, so its first observation is
        // also uncorrected
        let mut si = ulm_with_clock(5_000_000);
        state.correct_overflow(DetectorType::Silicon, 5000, &mut si);
        assert_eq!(si.clock, 5_000_000);
    }
}
