//! Patch (instrument sample) data types.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Key for referencing patches in a [`PatchBank`].
    pub struct PatchKey;
}

/// Patch storage owned by the loaded module. The mixer only borrows it.
pub type PatchBank = SlotMap<PatchKey, Patch>;

/// Default note at which a patch plays at its base frequency (C-4).
pub const DEFAULT_BASE_NOTE: i32 = 48;

/// A patch definition.
#[derive(Clone, Debug)]
pub struct Patch {
    /// Patch name
    pub name: ArrayString<32>,
    /// Audio data
    pub data: PatchData,
    /// Loop start position (in sample frames)
    pub loop_start: u32,
    /// Loop end position (in sample frames, exclusive)
    pub loop_end: u32,
    /// Loop mode
    pub loop_mode: LoopMode,
    /// Playback rate of the data at `base_note`, in Hz
    pub base_freq: u32,
    /// Note that plays the data unshifted
    pub base_note: i32,
    /// Default panning (-128 to +127, 0 = center)
    pub panning: i8,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: PatchData::Pcm8(Vec::new()),
            loop_start: 0,
            loop_end: 0,
            loop_mode: LoopMode::None,
            base_freq: 8363,
            base_note: DEFAULT_BASE_NOTE,
            panning: 0,
        }
    }
}

impl Patch {
    /// Create a new empty patch.
    pub fn new(name: &str) -> Self {
        let mut patch = Self::default();
        let _ = patch.name.try_push_str(name);
        patch
    }

    /// Create a patch playing `data` with the given loop.
    pub fn with_data(name: &str, data: PatchData, loop_mode: LoopMode, loop_start: u32, loop_end: u32) -> Self {
        let mut patch = Self::new(name);
        patch.data = data;
        patch.loop_mode = loop_mode;
        patch.loop_start = loop_start;
        patch.loop_end = loop_end;
        patch
    }

    /// Number of sample frames (0 for synth patches).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for patches rendered by the synth generator instead of sample reads.
    pub fn is_synth(&self) -> bool {
        matches!(self.data, PatchData::Synth(_))
    }

    pub fn is_16bit(&self) -> bool {
        matches!(self.data, PatchData::Pcm16(_))
    }

    /// True if the patch loops (forward or ping-pong). Degenerate loops are still
    /// reported as looping; the mixer stops them at the first boundary.
    pub fn is_looping(&self) -> bool {
        self.loop_mode != LoopMode::None
    }

    /// Loop bounds clamped to the sample length.
    pub fn loop_bounds(&self) -> (u32, u32) {
        let len = self.len() as u32;
        (self.loop_start.min(len), self.loop_end.min(len))
    }

    /// End boundary for a voice starting on this patch: the loop end when
    /// looping, otherwise the sample length.
    pub fn playable_end(&self) -> u32 {
        let len = self.len() as u32;
        if self.is_looping() {
            len.min(self.loop_end)
        } else {
            len
        }
    }

    /// Data indices read for the two frames following `playable_end`.
    ///
    /// Interpolation reads one frame past the current position and a voice
    /// may sit exactly on its end boundary, so the frames at `end` and
    /// `end + 1` are served from these indices instead of the raw data.
    /// Returns `None` for patches without sample data.
    pub fn guard_indices(&self) -> Option<[usize; 2]> {
        let end = self.playable_end() as usize;
        if end == 0 {
            return None;
        }
        let last = end - 1;
        Some(match self.loop_mode {
            LoopMode::Forward => {
                let (start, _) = self.loop_bounds();
                let start = (start as usize).min(last);
                [start, (start + 1).min(last)]
            }
            LoopMode::PingPong => [last, last.saturating_sub(1)],
            LoopMode::None => [last, last],
        })
    }
}

/// Patch audio data.
#[derive(Clone, Debug)]
pub enum PatchData {
    /// 8-bit signed samples
    Pcm8(Vec<i8>),
    /// 16-bit signed samples
    Pcm16(Vec<i16>),
    /// Opaque synth instrument definition
    Synth(Vec<u8>),
}

impl PatchData {
    /// Convert unsigned 8-bit samples (center 0x80) to signed.
    pub fn from_unsigned8(raw: &[u8]) -> Self {
        PatchData::Pcm8(raw.iter().map(|&b| (b ^ 0x80) as i8).collect())
    }

    /// Convert unsigned 16-bit samples (center 0x8000) to signed.
    pub fn from_unsigned16(raw: &[u16]) -> Self {
        PatchData::Pcm16(raw.iter().map(|&w| (w ^ 0x8000) as i16).collect())
    }

    /// Number of sample frames (0 for synth data).
    pub fn len(&self) -> usize {
        match self {
            PatchData::Pcm8(v) => v.len(),
            PatchData::Pcm16(v) => v.len(),
            PatchData::Synth(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sample loop mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Play once
    #[default]
    None,
    /// Jump back to loop start at loop end
    Forward,
    /// Reverse direction at each loop edge
    PingPong,
}
