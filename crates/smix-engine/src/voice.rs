//! Voice: per-voice playback state and its loop state machine.

use smix_ir::{LoopMode, PatchKey};

use crate::anticlick::Residual;
use crate::filter::FilterCoefficients;
use crate::fixed::{GAIN_SHIFT, PAN_CENTER, SMIX_MASK, SMIX_SHIFT};
use crate::frequency::{period_to_increment, pitch_base};

bitflags::bitflags! {
    /// Rendering options fixed when a patch is bound to a voice.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct VoiceFlags: u8 {
        /// Linear interpolation between adjacent frames.
        const INTERPOLATE = 0x01;
        /// 16-bit sample data.
        const WIDE = 0x02;
        /// Resonant filter enabled for the module.
        const FILTER = 0x08;
        /// Rendered by the synth generator, not sample reads.
        const SYNTH = 0x10;
    }
}

/// Playback state of a voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    /// Not producing output.
    #[default]
    Stopped,
    /// Moving forward through the sample.
    Playing,
    /// Moving backward through a ping-pong loop.
    ReverseLoop,
}

/// What happens when a voice reaches its end boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Boundary {
    /// Fade out and free the voice.
    #[default]
    Stop,
    /// Jump back by the loop length.
    Rewind,
    /// Reflect and reverse direction.
    Reverse,
}

impl Boundary {
    pub fn for_loop(mode: LoopMode) -> Self {
        match mode {
            LoopMode::None => Boundary::Stop,
            LoopMode::Forward => Boundary::Rewind,
            LoopMode::PingPong => Boundary::Reverse,
        }
    }
}

/// Per-voice resonant filter parameters and history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterState {
    /// Cutoff (0-255); 0xfe and above bypass the filter
    pub cutoff: u8,
    /// Resonance (0-255)
    pub resonance: u8,
    pub coeffs: FilterCoefficients,
    /// Previous two outputs, most recent first
    pub history: [i32; 2],
}

impl Default for FilterState {
    fn default() -> Self {
        Self { cutoff: 0xff, resonance: 0, coeffs: FilterCoefficients::default(), history: [0; 2] }
    }
}

/// A single mixer voice.
///
/// Positions are 16.16 fixed point split across `pos` (whole frames) and
/// `frac` (always within `0..=SMIX_MASK`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Voice {
    /// Owning tracker channel; `None` means the voice is free.
    pub channel: Option<usize>,
    /// Patch being played.
    pub patch: Option<PatchKey>,
    pub note: i32,
    pub period: i32,
    /// Rate at which the patch data plays at `base_note`, in Hz.
    pub base_freq: u32,
    pub base_note: i32,
    /// Step at period 1 (see [`crate::frequency::pitch_base`]).
    pub pitch_base: i64,
    pub pos: i32,
    pub frac: i32,
    /// Boundary the voice is travelling toward.
    pub end: i32,
    /// Signed step used for the last rendered frame.
    pub increment: i32,
    pub volume: u8,
    /// Pan (-128 = hard right, +127 = hard left)
    pub pan: i8,
    pub flags: VoiceFlags,
    pub state: PlayState,
    pub boundary: Boundary,
    pub loop_start: i32,
    pub loop_end: i32,
    pub filter: FilterState,
    /// Contribution to the last frame rendered.
    pub residual: Residual,
}

impl Voice {
    pub fn is_free(&self) -> bool {
        self.channel.is_none()
    }

    /// True when the voice should be visited by the tick renderer.
    pub fn is_active(&self) -> bool {
        !self.is_free() && self.state != PlayState::Stopped
    }

    /// Channel gains `(right, left)`, each `(volume * (0x80 ∓ pan)) >> 4`.
    pub fn gains(&self) -> (i32, i32) {
        let vol = i32::from(self.volume);
        let pan = i32::from(self.pan);
        ((vol * (PAN_CENTER - pan)) >> GAIN_SHIFT, (vol * (PAN_CENTER + pan)) >> GAIN_SHIFT)
    }

    /// Recompute the pitch base for output at `sample_rate`.
    pub fn retune(&mut self, sample_rate: u32) {
        self.pitch_base = pitch_base(self.base_freq, self.base_note, sample_rate);
    }

    /// Signed step for the current period and direction.
    pub fn step(&self) -> i32 {
        let inc = period_to_increment(self.pitch_base, self.period);
        if self.state == PlayState::ReverseLoop {
            -inc
        } else {
            inc
        }
    }

    /// Frames that can be rendered with step `inc` before passing `end`.
    ///
    /// A zero step never reaches the boundary. A voice already past its
    /// boundary in the direction of travel gets 0.
    pub fn run_length(&self, inc: i32) -> usize {
        if inc == 0 {
            return usize::MAX;
        }
        if (inc > 0 && self.end < self.pos) || (inc < 0 && self.end > self.pos) {
            return 0;
        }
        let span = ((i64::from(self.end) - i64::from(self.pos)) << SMIX_SHIFT) - i64::from(self.frac);
        let count = 1 + span / i64::from(inc);
        usize::try_from(count.max(0)).unwrap_or(usize::MAX)
    }

    /// Move the position on by `count` steps of `inc`.
    pub fn advance(&mut self, inc: i32, count: usize) {
        let total = i64::from(self.frac) + i64::from(inc) * count as i64;
        self.pos = self.pos.wrapping_add((total >> SMIX_SHIFT) as i32);
        self.frac = (total & i64::from(SMIX_MASK)) as i32;
    }

    /// Handle reaching the end boundary.
    ///
    /// Returns `false` when the voice must stop: it has no loop, or its loop
    /// is empty. On a reverse, `inc` is negated in place.
    pub fn cross_boundary(&mut self, inc: &mut i32) -> bool {
        let (start, end) = (self.loop_start, self.loop_end);
        match self.boundary {
            Boundary::Stop => false,
            _ if start >= end => false,
            Boundary::Rewind => {
                self.pos -= end - start;
                true
            }
            Boundary::Reverse => {
                self.state = match self.state {
                    PlayState::ReverseLoop => PlayState::Playing,
                    _ => PlayState::ReverseLoop,
                };
                *inc = -*inc;
                self.frac += *inc;
                self.pos += (self.frac >> SMIX_SHIFT) + 1;
                self.frac &= SMIX_MASK;
                self.end = if *inc > 0 { end } else { start };
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looping(boundary: Boundary, start: i32, end: i32) -> Voice {
        Voice {
            channel: Some(0),
            state: PlayState::Playing,
            boundary,
            loop_start: start,
            loop_end: end,
            end,
            ..Voice::default()
        }
    }

    #[test]
    fn default_voice_is_free() {
        let v = Voice::default();
        assert!(v.is_free());
        assert!(!v.is_active());
        assert_eq!(v.filter.cutoff, 0xff);
    }

    #[test]
    fn centered_gains_are_equal() {
        let v = Voice { volume: 64, ..Voice::default() };
        assert_eq!(v.gains(), (512, 512));
    }

    #[test]
    fn positive_pan_favours_left() {
        let v = Voice { volume: 255, pan: 127, ..Voice::default() };
        let (right, left) = v.gains();
        assert_eq!(right, 255 >> 4);
        assert_eq!(left, (255 * 255) >> 4);
    }

    #[test]
    fn run_length_counts_frames_until_boundary() {
        let v = Voice { pos: 0, frac: 0, end: 10, ..Voice::default() };
        assert_eq!(v.run_length(1 << 16), 11);
        assert_eq!(v.run_length(2 << 16), 6);
        assert_eq!(v.run_length(0), usize::MAX);
    }

    #[test]
    fn run_length_is_zero_past_boundary() {
        let v = Voice { pos: 12, end: 10, ..Voice::default() };
        assert_eq!(v.run_length(1 << 16), 0);
        let v = Voice { pos: 8, end: 10, ..Voice::default() };
        assert_eq!(v.run_length(-(1 << 16)), 0);
    }

    #[test]
    fn advance_carries_fraction() {
        let mut v = Voice { pos: 3, frac: 0xc000, ..Voice::default() };
        v.advance(0x8000, 3);
        assert_eq!((v.pos, v.frac), (5, 0x4000));
        v.advance(-0x8000, 1);
        assert_eq!((v.pos, v.frac), (4, 0xc000));
    }

    #[test]
    fn rewind_moves_back_by_loop_length() {
        let mut v = looping(Boundary::Rewind, 4, 10);
        v.pos = 11;
        let mut inc = 1 << 16;
        assert!(v.cross_boundary(&mut inc));
        assert_eq!(v.pos, 5);
        assert_eq!(inc, 1 << 16);
    }

    #[test]
    fn reverse_reflects_and_toggles_direction() {
        let mut v = looping(Boundary::Reverse, 0, 100);
        v.pos = 101;
        let mut inc = 1 << 16;
        assert!(v.cross_boundary(&mut inc));
        assert_eq!(inc, -(1 << 16));
        assert_eq!(v.state, PlayState::ReverseLoop);
        assert_eq!((v.pos, v.frac), (101, 0));
        assert_eq!(v.end, 0);

        assert!(v.cross_boundary(&mut inc));
        assert_eq!(v.state, PlayState::Playing);
        assert_eq!(v.end, 100);
    }

    #[test]
    fn empty_loop_stops() {
        let mut v = looping(Boundary::Rewind, 10, 10);
        let mut inc = 1 << 16;
        assert!(!v.cross_boundary(&mut inc));
        let mut v = looping(Boundary::Stop, 0, 100);
        assert!(!v.cross_boundary(&mut inc));
    }

    #[test]
    fn step_is_negative_in_reverse() {
        let mut v = Voice { pitch_base: 100 << 16, period: 100, state: PlayState::Playing, ..Voice::default() };
        assert_eq!(v.step(), 1 << 16);
        v.state = PlayState::ReverseLoop;
        assert_eq!(v.step(), -(1 << 16));
    }
}
