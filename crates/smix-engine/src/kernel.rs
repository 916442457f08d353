//! Rendering kernels: the inner per-frame loops of the mixer.
//!
//! One kernel is monomorphized per combination of sample width, channel
//! layout, interpolation and filtering. Kernels only read voice state; the
//! caller advances the voice position afterwards.

use smix_ir::{Patch, PatchData};

use crate::filter::{FilterCoefficients, FILTER_BYPASS_CUTOFF};
use crate::fixed::{FILTER_SHIFT, SMIX_MASK, SMIX_SHIFT};
use crate::voice::{FilterState, VoiceFlags};

/// A stored sample word, widened to the 16-bit mixing scale.
pub trait SampleWord: Copy {
    fn to_mix(self) -> i32;
}

impl SampleWord for i8 {
    #[inline]
    fn to_mix(self) -> i32 {
        i32::from(self) << 8
    }
}

impl SampleWord for i16 {
    #[inline]
    fn to_mix(self) -> i32 {
        i32::from(self)
    }
}

/// Read access to a patch's playable frames.
///
/// Indices at and past the end of the view read the two guard frames, so
/// interpolating at the boundary never leaves the data.
#[derive(Clone, Copy, Debug)]
pub struct SampleView<'a, T> {
    data: &'a [T],
    guard: [T; 2],
}

impl<'a, T: SampleWord> SampleView<'a, T> {
    /// View `data[..end]` with guard frames taken from `data[guard[0]]` and
    /// `data[guard[1]]`. Returns `None` if the view would be empty or any
    /// index is out of range.
    pub fn new(data: &'a [T], end: usize, guard: [usize; 2]) -> Option<Self> {
        if end == 0 {
            return None;
        }
        let guard = [*data.get(guard[0])?, *data.get(guard[1])?];
        Some(Self { data: data.get(..end)?, guard })
    }

    #[inline]
    pub fn at(&self, index: i32) -> i32 {
        let word = match usize::try_from(index) {
            Ok(i) if i < self.data.len() => self.data[i],
            Ok(i) => self.guard[(i - self.data.len()).min(1)],
            Err(_) => self.data[0],
        };
        word.to_mix()
    }
}

/// The kernel variant for a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Kernel {
    pub wide: bool,
    pub stereo: bool,
    pub interpolate: bool,
    pub filter: bool,
}

impl Kernel {
    /// `stereo` follows the accumulator layout. Filtering is only applied
    /// together with interpolation, and only while the cutoff is below the
    /// bypass threshold.
    pub fn select(flags: VoiceFlags, cutoff: u8, stereo: bool) -> Self {
        let interpolate = flags.contains(VoiceFlags::INTERPOLATE);
        Self {
            wide: flags.contains(VoiceFlags::WIDE),
            stereo,
            interpolate,
            filter: interpolate && flags.contains(VoiceFlags::FILTER) && cutoff < FILTER_BYPASS_CUTOFF,
        }
    }
}

/// One contiguous run of frames to render for a voice.
#[derive(Debug)]
pub struct Run<'a> {
    /// Accumulator frames to add into (`frames * stride` samples)
    pub out: &'a mut [i32],
    pub pos: i32,
    pub frac: i32,
    pub inc: i32,
    pub gain_r: i32,
    pub gain_l: i32,
}

/// Render `run` from `patch` with the given kernel.
///
/// Synth and empty patches render nothing.
pub fn render(kernel: Kernel, patch: &Patch, run: Run<'_>, filter: &mut FilterState) {
    let end = patch.playable_end() as usize;
    let Some(guard) = patch.guard_indices() else {
        return;
    };
    match &patch.data {
        PatchData::Pcm8(data) => {
            if let Some(view) = SampleView::new(data, end, guard) {
                dispatch(kernel, &view, run, filter);
            }
        }
        PatchData::Pcm16(data) => {
            if let Some(view) = SampleView::new(data, end, guard) {
                dispatch(kernel, &view, run, filter);
            }
        }
        PatchData::Synth(_) => {}
    }
}

fn dispatch<T: SampleWord>(kernel: Kernel, view: &SampleView<'_, T>, run: Run<'_>, filter: &mut FilterState) {
    match (kernel.stereo, kernel.interpolate, kernel.filter) {
        (false, false, _) => mix::<T, false, false, false>(view, run, filter),
        (false, true, false) => mix::<T, false, true, false>(view, run, filter),
        (false, true, true) => mix::<T, false, true, true>(view, run, filter),
        (true, false, _) => mix::<T, true, false, false>(view, run, filter),
        (true, true, false) => mix::<T, true, true, false>(view, run, filter),
        (true, true, true) => mix::<T, true, true, true>(view, run, filter),
    }
}

#[inline]
fn mix<T: SampleWord, const STEREO: bool, const INTERP: bool, const FILTER: bool>(
    view: &SampleView<'_, T>,
    run: Run<'_>,
    filter: &mut FilterState,
) {
    let stride = if STEREO { 2 } else { 1 };
    let FilterCoefficients { gain: a0, fb0: b0, fb1: b1 } = filter.coeffs;
    let [mut y1, mut y2] = filter.history;
    let (mut pos, mut frac) = (run.pos, run.frac);

    for frame in run.out.chunks_exact_mut(stride) {
        let s0 = view.at(pos);
        let mut smp = if INTERP {
            let delta = view.at(pos.wrapping_add(1)) - s0;
            s0 + (((frac >> 1) * delta) >> (SMIX_SHIFT - 1))
        } else {
            s0
        };

        if FILTER {
            let y = (i64::from(a0) * i64::from(smp) + i64::from(b0) * i64::from(y1) + i64::from(b1) * i64::from(y2))
                >> FILTER_SHIFT;
            y2 = y1;
            y1 = y as i32;
            smp = y1;
        }

        frame[0] = frame[0].wrapping_add(smp.wrapping_mul(run.gain_r));
        if STEREO {
            frame[1] = frame[1].wrapping_add(smp.wrapping_mul(run.gain_l));
        }

        frac += run.inc;
        pos = pos.wrapping_add(frac >> SMIX_SHIFT);
        frac &= SMIX_MASK;
    }

    if FILTER {
        filter.history = [y1, y2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use smix_ir::LoopMode;

    fn ramp8(len: usize) -> Patch {
        Patch::with_data("ramp", PatchData::Pcm8((0..len).map(|i| i as i8).collect()), LoopMode::None, 0, 0)
    }

    fn run(out: &mut [i32], pos: i32, frac: i32, inc: i32) -> Run<'_> {
        Run { out, pos, frac, inc, gain_r: 1, gain_l: 2 }
    }

    #[test]
    fn eight_bit_samples_are_scaled_up() {
        let patch = ramp8(8);
        let mut out = vec![0i32; 4];
        let kernel = Kernel::select(VoiceFlags::empty(), 0xff, false);
        render(kernel, &patch, run(&mut out, 0, 0, 1 << 16), &mut FilterState::default());
        assert_eq!(out, vec![0, 256, 512, 768]);
    }

    #[test]
    fn interpolation_blends_neighbours() {
        let patch = ramp8(8);
        let mut out = vec![0i32; 4];
        let kernel = Kernel::select(VoiceFlags::INTERPOLATE, 0xff, false);
        render(kernel, &patch, run(&mut out, 1, 0x8000, 1 << 15), &mut FilterState::default());
        // Positions 1.5, 2.0, 2.5, 3.0
        assert_eq!(out, vec![384, 512, 640, 768]);
    }

    #[test]
    fn stereo_applies_both_gains() {
        let patch = Patch::with_data("w", PatchData::Pcm16(vec![1000, -1000]), LoopMode::None, 0, 0);
        let mut out = vec![5i32; 4];
        let kernel = Kernel::select(VoiceFlags::WIDE, 0xff, true);
        render(kernel, &patch, run(&mut out, 0, 0, 1 << 16), &mut FilterState::default());
        assert_eq!(out, vec![1005, 2005, -995, -1995]);
    }

    #[test]
    fn reads_past_end_use_guard_frames() {
        let patch = Patch::with_data("loop", PatchData::Pcm16(vec![10, 20, 30, 40]), LoopMode::Forward, 1, 4);
        let mut out = vec![0i32; 6];
        let kernel = Kernel::select(VoiceFlags::empty(), 0xff, false);
        render(kernel, &patch, run(&mut out, 2, 0, 1 << 16), &mut FilterState::default());
        // Index 4 and 5 read loop start and the frame after it.
        assert_eq!(&out[..4], &[30, 40, 20, 30]);
    }

    #[test]
    fn filter_requires_interpolation() {
        assert!(!Kernel::select(VoiceFlags::FILTER, 0x10, false).filter);
        assert!(Kernel::select(VoiceFlags::FILTER | VoiceFlags::INTERPOLATE, 0x10, false).filter);
        assert!(!Kernel::select(VoiceFlags::FILTER | VoiceFlags::INTERPOLATE, FILTER_BYPASS_CUTOFF, false).filter);
    }

    #[test]
    fn filter_updates_history() {
        let patch = Patch::with_data("dc", PatchData::Pcm16(vec![1000; 16]), LoopMode::None, 0, 0);
        let mut out = vec![0i32; 3];
        let mut state = FilterState {
            cutoff: 0x40,
            coeffs: FilterCoefficients { gain: 1 << 15, fb0: 1 << 15, fb1: 0 },
            ..FilterState::default()
        };
        let kernel = Kernel::select(VoiceFlags::FILTER | VoiceFlags::INTERPOLATE, state.cutoff, false);
        render(kernel, &patch, run(&mut out, 0, 0, 1 << 16), &mut state);
        // y = x/2 + y1/2
        assert_eq!(out, vec![500, 750, 875]);
        assert_eq!(state.history, [875, 750]);
    }

    #[test]
    fn accumulation_wraps_instead_of_panicking() {
        let patch = Patch::with_data("w", PatchData::Pcm16(vec![i16::MAX]), LoopMode::None, 0, 0);
        let mut out = vec![i32::MAX];
        let kernel = Kernel::select(VoiceFlags::empty(), 0xff, false);
        render(kernel, &patch, run(&mut out, 0, 0, 1 << 16), &mut FilterState::default());
        assert_eq!(out[0], i32::MAX.wrapping_add(i32::from(i16::MAX)));
    }

    #[test]
    fn synth_patch_renders_nothing() {
        let patch = Patch::with_data("s", PatchData::Synth(vec![1, 2]), LoopMode::None, 0, 0);
        let mut out: Vec<i32> = vec![0; 4];
        render(Kernel::select(VoiceFlags::empty(), 0xff, false), &patch, run(&mut out, 0, 0, 1 << 16), &mut FilterState::default());
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn view_rejects_bad_guard() {
        let data = [1i16, 2, 3];
        assert!(SampleView::new(&data, 3, [0, 7]).is_none());
        assert!(SampleView::new(&data, 0, [0, 0]).is_none());
        let view = SampleView::new(&data, 3, [0, 1]).expect("valid view");
        assert_eq!((view.at(-1), view.at(3), view.at(4), view.at(50)), (1, 1, 2, 2));
    }
}
