//! Synth voice generators.
//!
//! Voices bound to synth patches are not rendered from sample data. Instead
//! the first synth voice met in a tick asks the generator to render all of
//! its voices at once.

use heapless::Vec;

/// A synthesizer driven by the mixer's synth voices.
pub trait Synth: Send {
    fn init(&mut self, sample_rate: u32);
    /// Bind an instrument definition to `voice`.
    fn set_patch(&mut self, voice: usize, data: &[u8]);
    /// Set the pitch of `voice` as a note plus bend in cents.
    fn set_note(&mut self, voice: usize, note: i32, bend: i32);
    /// Add `frames` frames of output into `buffer` (interleaved when `stereo`).
    fn render(&mut self, buffer: &mut [i32], frames: usize, gain_l: i32, gain_r: i32, stereo: bool);
    /// Silence and forget `voice`.
    fn reset(&mut self, voice: usize);
}

/// Silent generator, used when no synth is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSynth;

impl Synth for NullSynth {
    fn init(&mut self, _sample_rate: u32) {}
    fn set_patch(&mut self, _voice: usize, _data: &[u8]) {}
    fn set_note(&mut self, _voice: usize, _note: i32, _bend: i32) {}
    fn render(&mut self, _buffer: &mut [i32], _frames: usize, _gain_l: i32, _gain_r: i32, _stereo: bool) {}
    fn reset(&mut self, _voice: usize) {}
}

/// Oscillators a [`SquareSynth`] can run at once.
pub const MAX_SYNTH_VOICES: usize = 16;

/// Note of A-4 (440 Hz) in mixer note numbering.
const A4_NOTE: i32 = 57;

#[derive(Clone, Copy, Debug)]
struct Oscillator {
    voice: usize,
    phase: u32,
    step: u32,
    /// Peak amplitude on the 16-bit scale
    level: i32,
}

/// Square wave generator.
///
/// The first byte of a patch definition is the level (0-255, default 128).
#[derive(Clone, Debug)]
pub struct SquareSynth {
    sample_rate: u32,
    oscillators: Vec<Oscillator, MAX_SYNTH_VOICES>,
}

impl Default for SquareSynth {
    fn default() -> Self {
        Self { sample_rate: 44100, oscillators: Vec::new() }
    }
}

impl SquareSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_voices(&self) -> usize {
        self.oscillators.len()
    }

    fn find(&mut self, voice: usize) -> Option<&mut Oscillator> {
        self.oscillators.iter_mut().find(|o| o.voice == voice)
    }
}

impl Synth for SquareSynth {
    fn init(&mut self, sample_rate: u32) {
        let rate = sample_rate.max(1);
        for osc in self.oscillators.iter_mut() {
            let step = u64::from(osc.step) * u64::from(self.sample_rate) / u64::from(rate);
            osc.step = u32::try_from(step).unwrap_or(u32::MAX);
        }
        self.sample_rate = rate;
    }

    fn set_patch(&mut self, voice: usize, data: &[u8]) {
        let level = i32::from(data.first().copied().unwrap_or(128)) << 7;
        if let Some(osc) = self.find(voice) {
            osc.level = level;
            osc.phase = 0;
            return;
        }
        if self.oscillators.push(Oscillator { voice, phase: 0, step: 0, level }).is_err() {
            log::warn!("synth voice table full, voice {} stays silent", voice);
        }
    }

    fn set_note(&mut self, voice: usize, note: i32, bend: i32) {
        let cents = f64::from(note - A4_NOTE) * 100.0 + f64::from(bend);
        let freq = 440.0 * libm::exp2(cents / 1200.0);
        let rate = f64::from(self.sample_rate);
        if let Some(osc) = self.find(voice) {
            let step = freq / rate * 4_294_967_296.0;
            osc.step = if step >= u32::MAX as f64 { u32::MAX } else { step as u32 };
        }
    }

    fn render(&mut self, buffer: &mut [i32], frames: usize, gain_l: i32, gain_r: i32, stereo: bool) {
        let stride = if stereo { 2 } else { 1 };
        for frame in buffer.chunks_exact_mut(stride).take(frames) {
            for osc in self.oscillators.iter_mut() {
                let smp = if osc.phase < 0x8000_0000 { osc.level } else { -osc.level };
                osc.phase = osc.phase.wrapping_add(osc.step);
                frame[0] = frame[0].wrapping_add(smp.wrapping_mul(gain_r));
                if stereo {
                    frame[1] = frame[1].wrapping_add(smp.wrapping_mul(gain_l));
                }
            }
        }
    }

    fn reset(&mut self, voice: usize) {
        self.oscillators.retain(|o| o.voice != voice);
    }
}
