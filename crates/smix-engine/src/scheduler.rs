//! Tick scheduler: renders every active voice into the accumulator.
//!
//! Each voice is rendered in runs that end at its next boundary. Between runs
//! the voice's boundary action is applied (rewind, reverse, or stop), so one
//! tick can cross a loop point many times.

use smix_ir::{Patch, PatchBank};

use crate::anticlick::{self, Residual, FADE_FRAMES};
use crate::kernel::{self, Kernel, Run};
use crate::synth::Synth;
use crate::voice::{Voice, VoiceFlags};

/// Render one tick into `acc`, which holds exactly one tick of interleaved
/// frames (`stride` 2 when `stereo`).
///
/// The mixer-wide residual left over from earlier voice changes is faded in
/// first. Voices are visited from the highest index down.
pub fn mix_tick(
    voices: &mut [Voice],
    bank: &PatchBank,
    acc: &mut [i32],
    stereo: bool,
    global: &mut Residual,
    synth: &mut dyn Synth,
) {
    let stride = if stereo { 2 } else { 1 };
    let frames = acc.len() / stride;

    anticlick::ramp_down(core::mem::take(global), acc, stride, FADE_FRAMES);

    let mut synth_pending = true;
    for index in (0..voices.len()).rev() {
        let voice = &mut voices[index];
        if !voice.is_active() {
            continue;
        }
        if voice.period < 1 {
            log::debug!("voice {} has no pitch, releasing", index);
            release_voice(voice, index, global, synth);
            continue;
        }

        let (gain_r, gain_l) = voice.gains();

        if voice.flags.contains(VoiceFlags::SYNTH) {
            if synth_pending {
                synth.render(acc, frames, gain_l, gain_r, stereo);
                synth_pending = false;
            }
            continue;
        }

        let Some(patch) = voice.patch.and_then(|key| bank.get(key)) else {
            log::debug!("voice {} lost its patch, releasing", index);
            release_voice(voice, index, global, synth);
            continue;
        };

        if !mix_voice(voice, patch, acc, stride, gain_r, gain_l) {
            release_voice(voice, index, global, synth);
        }
    }
}

/// Free a voice, keeping whatever it still owes the output.
pub fn release_voice(voice: &mut Voice, index: usize, global: &mut Residual, synth: &mut dyn Synth) {
    global.absorb(voice.residual);
    if voice.flags.contains(VoiceFlags::SYNTH) {
        synth.reset(index);
    }
    *voice = Voice::default();
}

/// Render one sample voice for the whole tick. Returns `false` once the voice
/// has run off a non-looping end; its tail is already faded out.
fn mix_voice(voice: &mut Voice, patch: &Patch, acc: &mut [i32], stride: usize, gain_r: i32, gain_l: i32) -> bool {
    let mut inc = voice.step();
    let mut remaining = acc.len() / stride;
    let mut cursor = 0;

    while remaining > 0 {
        let count = voice.run_length(inc).min(remaining);

        if voice.volume != 0 {
            let out = &mut acc[cursor * stride..(cursor + count) * stride];
            let before = last_frame(out, stride);
            let kernel = Kernel::select(voice.flags, voice.filter.cutoff, stride > 1);
            let run = Run { out, pos: voice.pos, frac: voice.frac, inc, gain_r, gain_l };
            kernel::render(kernel, patch, run, &mut voice.filter);

            let out = &acc[cursor * stride..(cursor + count) * stride];
            let after = last_frame(out, stride);
            voice.residual = Residual {
                right: after.right.wrapping_sub(before.right),
                left: after.left.wrapping_sub(before.left),
            };
            cursor += count;
        }

        voice.advance(inc, count);
        remaining -= count;
        if remaining == 0 {
            break;
        }

        if !voice.cross_boundary(&mut inc) {
            let tail = core::mem::take(&mut voice.residual);
            anticlick::ramp_down(tail, &mut acc[cursor * stride..], stride, remaining.min(FADE_FRAMES));
            return false;
        }
    }

    voice.increment = inc;
    true
}

/// Values of the last frame in `out`, or zero if it is empty.
fn last_frame(out: &[i32], stride: usize) -> Residual {
    match out.len().checked_sub(stride) {
        Some(at) => Residual { right: out[at], left: if stride > 1 { out[at + 1] } else { 0 } },
        None => Residual::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::SMIX_SHIFT;
    use crate::synth::NullSynth;
    use crate::voice::{Boundary, PlayState};
    use alloc::vec;
    use alloc::vec::Vec;
    use smix_ir::{LoopMode, PatchData};

    /// Patch whose frame values equal their index (16-bit).
    fn index_patch(len: usize, mode: LoopMode, start: u32, end: u32) -> Patch {
        Patch::with_data("idx", PatchData::Pcm16((0..len as i16).collect()), mode, start, end)
    }

    /// A voice stepping one frame per output frame with unity gain in mono.
    fn unity_voice(bank: &mut PatchBank, patch: Patch, pos: i32) -> Voice {
        let boundary = Boundary::for_loop(patch.loop_mode);
        let (start, end) = patch.loop_bounds();
        let playable = patch.playable_end() as i32;
        let key = bank.insert(patch);
        Voice {
            channel: Some(0),
            patch: Some(key),
            period: 1,
            pitch_base: 1 << SMIX_SHIFT,
            pos,
            end: playable,
            volume: 16,
            pan: -128,
            flags: VoiceFlags::WIDE,
            state: PlayState::Playing,
            boundary,
            loop_start: start as i32,
            loop_end: end as i32,
            ..Voice::default()
        }
    }

    fn render(voices: &mut [Voice], bank: &PatchBank, frames: usize) -> (Vec<i32>, Residual) {
        let mut acc = vec![0i32; frames];
        let mut global = Residual::default();
        mix_tick(voices, bank, &mut acc, false, &mut global, &mut NullSynth);
        (acc, global)
    }

    #[test]
    fn single_voice_conserves_sample_values() {
        let mut bank = PatchBank::with_key();
        let mut voices = vec![unity_voice(&mut bank, index_patch(64, LoopMode::None, 0, 0), 10)];
        voices[0].volume = 8;
        let gain = voices[0].gains().0;
        assert_eq!(gain, 128);
        let (acc, _) = render(&mut voices, &bank, 8);
        let expected: Vec<i32> = (10..18).map(|i| i * gain).collect();
        assert_eq!(acc, expected);
        assert_eq!(voices[0].pos, 18);
    }

    #[test]
    fn full_volume_center_pan_conserves_both_channels() {
        let mut bank = PatchBank::with_key();
        let patch = Patch::with_data("dc", PatchData::Pcm16(vec![i16::MAX; 64]), LoopMode::None, 0, 0);
        let mut voices = vec![unity_voice(&mut bank, patch, 0)];
        voices[0].volume = 255;
        voices[0].pan = 0;
        assert_eq!(voices[0].gains(), (2040, 2040));

        let mut acc = vec![0i32; 16];
        let mut global = Residual::default();
        mix_tick(&mut voices, &bank, &mut acc, true, &mut global, &mut NullSynth);
        for frame in acc.chunks_exact(2) {
            assert_eq!(frame, [32767 * 2040, 32767 * 2040]);
        }
        assert_eq!(voices[0].pos, 8);
    }

    #[test]
    fn hard_pan_is_asymmetric() {
        let mut bank = PatchBank::with_key();
        let patch = Patch::with_data("dc", PatchData::Pcm16(vec![1000; 64]), LoopMode::None, 0, 0);
        let mut voices = vec![unity_voice(&mut bank, patch, 0)];
        voices[0].volume = 255;
        voices[0].pan = 127;
        // Right gets (0x80 - 127), left (0x80 + 127).
        assert_eq!(voices[0].gains(), (15, 4064));

        let mut acc = vec![0i32; 4];
        let mut global = Residual::default();
        mix_tick(&mut voices, &bank, &mut acc, true, &mut global, &mut NullSynth);
        assert_eq!(acc, [15_000, 4_064_000, 15_000, 4_064_000]);
    }

    #[test]
    fn forward_loop_wraps_to_loop_start() {
        let mut bank = PatchBank::with_key();
        let mut voices = vec![unity_voice(&mut bank, index_patch(100, LoopMode::Forward, 0, 100), 95)];
        voices[0].volume = 1; // gain (1 * 256) >> 4 = 16
        let (acc, _) = render(&mut voices, &bank, 10);
        let values: Vec<i32> = acc.iter().map(|v| v / 16).collect();
        assert_eq!(values, [95, 96, 97, 98, 99, 0, 1, 2, 3, 4]);
        assert!(!voices[0].is_free());
    }

    #[test]
    fn pingpong_loop_reflects_at_end() {
        let mut bank = PatchBank::with_key();
        // Values beyond the loop end expose which index was read.
        let patch = index_patch(110, LoopMode::PingPong, 0, 110);
        let mut voices = vec![unity_voice(&mut bank, patch, 95)];
        voices[0].end = 100;
        voices[0].loop_end = 100;
        voices[0].volume = 1;
        let (acc, _) = render(&mut voices, &bank, 10);
        let values: Vec<i32> = acc.iter().map(|v| v / 16).collect();
        assert_eq!(values, [95, 96, 97, 98, 99, 100, 101, 100, 99, 98]);
        assert_eq!(voices[0].state, PlayState::ReverseLoop);
        assert_eq!(voices[0].increment, -(1 << SMIX_SHIFT));
    }

    #[test]
    fn one_shot_voice_stops_and_fades() {
        let mut bank = PatchBank::with_key();
        let patch = Patch::with_data("dc", PatchData::Pcm16(vec![1000; 4]), LoopMode::None, 0, 0);
        let mut voices = vec![unity_voice(&mut bank, patch, 0)];
        voices[0].volume = 1;
        let (acc, global) = render(&mut voices, &bank, 12);
        // Indices 0..=3 plus the guard frame at 4, then a 7-frame fade.
        assert_eq!(&acc[..5], &[16000; 5]);
        let tail = &acc[5..];
        for pair in tail.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!(tail[6] < 16000 / 7);
        assert!(voices[0].is_free());
        assert!(global.is_silent());
    }

    #[test]
    fn zero_period_releases_voice() {
        let mut bank = PatchBank::with_key();
        let mut voices = vec![unity_voice(&mut bank, index_patch(8, LoopMode::None, 0, 0), 0)];
        voices[0].period = 0;
        voices[0].residual = Residual { right: 77, left: 0 };
        let (acc, global) = render(&mut voices, &bank, 4);
        assert!(voices[0].is_free());
        assert!(acc.iter().all(|&v| v == 0));
        assert_eq!(global.right, 77);
    }

    #[test]
    fn muted_voice_still_advances() {
        let mut bank = PatchBank::with_key();
        let mut voices = vec![unity_voice(&mut bank, index_patch(64, LoopMode::None, 0, 0), 0)];
        voices[0].volume = 0;
        let (acc, _) = render(&mut voices, &bank, 16);
        assert!(acc.iter().all(|&v| v == 0));
        assert_eq!(voices[0].pos, 16);
    }

    #[test]
    fn global_residual_is_faded_and_cleared() {
        let bank = PatchBank::with_key();
        let mut acc = vec![0i32; 32];
        let mut global = Residual { right: 1600, left: -1600 };
        mix_tick(&mut [], &bank, &mut acc, true, &mut global, &mut NullSynth);
        assert!(global.is_silent());
        assert_eq!((acc[0], acc[1]), (1500, -1500));
        assert_eq!((acc[30], acc[31]), (0, 0));
    }

    #[test]
    fn residual_tracks_last_frame() {
        let mut bank = PatchBank::with_key();
        let mut voices = vec![unity_voice(&mut bank, index_patch(64, LoopMode::None, 0, 0), 0)];
        voices[0].volume = 1;
        render(&mut voices, &bank, 8);
        assert_eq!(voices[0].residual, Residual { right: 7 * 16, left: 0 });
    }
}
