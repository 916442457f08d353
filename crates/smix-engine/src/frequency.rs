//! Note-to-period and period-to-increment conversion.
//!
//! Periods are linear in time: a period of `PERIOD_SCALE` plays note 0, and each
//! octave up halves the period. A voice's 16.16 step through its sample is
//! `pitch_base / period`, where `pitch_base` folds together the patch's base
//! note and rate and the output sample rate.

use crate::fixed::{MAX_INCREMENT, SMIX_SHIFT};

/// Period of note 0 with no bend.
pub const PERIOD_SCALE: f64 = (1u32 << 24) as f64;

/// Cents per octave.
const OCTAVE_CENTS: f64 = 1200.0;

/// Convert a note plus pitch bend (in cents) to a period.
///
/// Periods that don't fit are clamped; notes far below 0 saturate at `i32::MAX`.
pub fn note_to_period(note: i32, bend: i32) -> i32 {
    let cents = i64::from(note) * 100 + i64::from(bend);
    let period = PERIOD_SCALE * libm::exp2(-(cents as f64) / OCTAVE_CENTS);
    if period >= i32::MAX as f64 {
        i32::MAX
    } else {
        period as i32
    }
}

/// Pitch base for a patch: the 16.16 step at period 1.
///
/// `base_freq` is the rate at which the patch data plays at `base_note`.
/// Returns 0 when `sample_rate` is 0.
pub fn pitch_base(base_freq: u32, base_note: i32, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    let period = i128::from(note_to_period(base_note, 0));
    let base = ((period * i128::from(base_freq)) << SMIX_SHIFT) / i128::from(sample_rate);
    base.min(i128::from(i64::MAX)) as i64
}

/// 16.16 sample step for `period`, clamped to `0..=MAX_INCREMENT`.
///
/// Periods below 1 step nowhere; the mixer frees such voices before asking.
pub fn period_to_increment(pitch_base: i64, period: i32) -> i32 {
    if period < 1 {
        return 0;
    }
    (pitch_base / i64::from(period)).clamp(0, i64::from(MAX_INCREMENT)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    const C4_SPEED: u32 = 8363;
    const SAMPLE_RATE: u32 = 44100;
    const BASE_NOTE: i32 = 48;

    fn increment(note: i32) -> i32 {
        let base = pitch_base(C4_SPEED, BASE_NOTE, SAMPLE_RATE);
        period_to_increment(base, note_to_period(note, 0))
    }

    #[test]
    fn whole_octaves_are_exact() {
        assert_eq!(note_to_period(0, 0), 1 << 24);
        assert_eq!(note_to_period(48, 0), 1 << 20);
        assert_eq!(note_to_period(60, 0), 1 << 19);
    }

    #[test]
    fn bend_of_one_semitone_matches_next_note() {
        assert_eq!(note_to_period(48, 100), note_to_period(49, 0));
        assert_eq!(note_to_period(48, -1200), note_to_period(36, 0));
    }

    #[test]
    fn reference_note_gives_base_frequency() {
        let expected = (C4_SPEED as u64 * 65536 / SAMPLE_RATE as u64) as i32;
        assert_eq!(increment(BASE_NOTE), expected);
    }

    #[test]
    fn octave_up_doubles_increment() {
        let base = increment(48);
        let up = increment(60);
        assert!((up - base * 2).abs() <= 1);
    }

    #[test]
    fn semitone_up_increases_by_twelfth_root_of_two() {
        let base = increment(48);
        let one_up = increment(49);
        let expected = (base as f64 * 1.059463) as i32;
        assert!((one_up - expected).abs() <= 1);
    }

    #[test]
    fn base_rate_equal_to_output_rate_steps_one_frame() {
        let base = pitch_base(44100, BASE_NOTE, 44100);
        assert_eq!(period_to_increment(base, note_to_period(BASE_NOTE, 0)), 1 << 16);
    }

    #[test]
    fn zero_sample_rate_returns_zero() {
        assert_eq!(pitch_base(C4_SPEED, BASE_NOTE, 0), 0);
    }

    #[test]
    fn zero_period_returns_zero() {
        assert_eq!(period_to_increment(1 << 40, 0), 0);
        assert_eq!(period_to_increment(1 << 40, -5), 0);
    }

    #[test]
    fn very_low_notes_saturate_period() {
        assert_eq!(note_to_period(-1000, 0), i32::MAX);
    }

    #[test]
    fn huge_steps_are_clamped() {
        assert_eq!(period_to_increment(i64::MAX, 1), MAX_INCREMENT);
    }
}
