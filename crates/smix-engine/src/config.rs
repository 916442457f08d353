//! Mixer and module timing configuration.

/// Lowest accepted output sample rate.
pub const MIN_RATE: u32 = 4000;
/// Highest accepted output sample rate.
pub const MAX_RATE: u32 = 96000;

/// Output sample encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    /// 8-bit G.711 μ-law
    Ulaw,
    /// 8-bit linear
    Bits8,
    /// 16-bit linear, native byte order
    #[default]
    Bits16,
}

impl Resolution {
    /// Map a bit depth to a resolution: 0 is μ-law, anything above 8 is 16-bit.
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Resolution::Ulaw,
            1..=8 => Resolution::Bits8,
            _ => Resolution::Bits16,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Resolution::Ulaw | Resolution::Bits8 => 1,
            Resolution::Bits16 => 2,
        }
    }
}

/// Output channel layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    #[default]
    Stereo,
}

impl ChannelMode {
    pub fn channels(self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }

    pub fn is_stereo(self) -> bool {
        self == ChannelMode::Stereo
    }
}

/// Output configuration, fixed between `enable` and `disable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MixerConfig {
    /// Number of output buffers in the ring
    pub buffer_count: usize,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    pub resolution: Resolution,
    pub channels: ChannelMode,
    /// Offset output samples to unsigned
    pub unsigned: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            buffer_count: 1,
            sample_rate: 44100,
            resolution: Resolution::Bits16,
            channels: ChannelMode::Stereo,
            unsigned: false,
        }
    }
}

impl MixerConfig {
    pub fn with_buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_channels(mut self, channels: ChannelMode) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    /// Copy with out-of-range values pulled into range.
    pub fn sanitized(self) -> Self {
        Self {
            buffer_count: self.buffer_count.max(1),
            sample_rate: self.sample_rate.clamp(MIN_RATE, MAX_RATE),
            ..self
        }
    }
}

/// How tempo maps to tick length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimingMode {
    /// `rate * replay_rate / tempo / 100` frames per tick
    #[default]
    Standard,
    /// MED-style BPM: `rate * replay_rate * 33 / tempo / 12500`
    MedBpm,
}

/// Module playback parameters, set by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleTiming {
    /// Replay rate scale (250 for standard trackers)
    pub replay_rate: u32,
    /// Tempo in BPM
    pub tempo: u32,
    pub mode: TimingMode,
    /// Interpolate newly configured voices
    pub interpolate: bool,
    /// Enable the resonant filter on newly configured voices
    pub filter: bool,
}

impl Default for ModuleTiming {
    fn default() -> Self {
        Self { replay_rate: 250, tempo: 125, mode: TimingMode::Standard, interpolate: true, filter: false }
    }
}
