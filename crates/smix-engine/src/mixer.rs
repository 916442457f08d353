//! The mixer engine object and its driver interface.

use alloc::boxed::Box;
use alloc::vec::Vec;
use smix_ir::{Patch, PatchBank, PatchData, PatchKey};

use crate::anticlick::Residual;
use crate::buffer::{tick_frames, BufferManager, Tick};
use crate::config::{MixerConfig, ModuleTiming};
use crate::error::MixerError;
use crate::filter::{filter_coefficients, FilterCoefficients};
use crate::frequency::note_to_period;
use crate::output::OutputFormat;
use crate::scheduler;
use crate::synth::{NullSynth, Synth};
use crate::voice::{Boundary, PlayState, Voice, VoiceFlags};

/// Default number of mixer voices.
pub const DEFAULT_VOICES: usize = 64;

/// Per-voice effect parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Filter cutoff (clamped to 0-255); coefficients are recomputed
    Cutoff(i32),
    /// Filter resonance (clamped to 0-255); coefficients are recomputed
    Resonance(i32),
    /// Raw input gain coefficient
    FilterB0(i32),
    /// Raw first feedback coefficient
    FilterB1(i32),
    /// Raw second feedback coefficient
    FilterB2(i32),
}

/// Software mixer: voices in, one converted output buffer per tick out.
///
/// The mixer is created disabled. [`enable`](Self::enable) allocates the
/// accumulator and output ring; only then can ticks be rendered. Voice
/// configuration calls work in either state; calls naming a voice index
/// beyond [`voice_count`](Self::voice_count) are ignored.
pub struct Mixer {
    voices: Vec<Voice>,
    /// Residual owed by voices that were reset or changed level
    residual: Residual,
    config: MixerConfig,
    timing: ModuleTiming,
    buffers: Option<BufferManager>,
    synth: Box<dyn Synth>,
}

impl Mixer {
    /// Create a disabled mixer with `num_voices` free voices.
    pub fn new(num_voices: usize) -> Self {
        Self {
            voices: (0..num_voices).map(|_| Voice::default()).collect(),
            residual: Residual::default(),
            config: MixerConfig::default(),
            timing: ModuleTiming::default(),
            buffers: None,
            synth: Box::new(NullSynth),
        }
    }

    /// Attach a synth generator for synth patches.
    pub fn with_synth(mut self, synth: Box<dyn Synth>) -> Self {
        self.synth = synth;
        self
    }

    /// Allocate output resources and start accepting ticks.
    ///
    /// Enabling an enabled mixer does nothing. On allocation failure the
    /// mixer stays disabled.
    pub fn enable(&mut self, config: MixerConfig) -> Result<(), MixerError> {
        if self.buffers.is_some() {
            log::debug!("mixer already enabled");
            return Ok(());
        }
        let config = config.sanitized();
        let frames = tick_frames(config.sample_rate, &self.timing);
        let buffers = BufferManager::new(config.buffer_count, config.channels.channels(), frames)?;

        if config.sample_rate != self.config.sample_rate {
            self.retune(config.sample_rate);
        }
        if !config.channels.is_stereo() {
            self.voices.iter_mut().for_each(|voice| voice.pan = 0);
        }
        self.synth.init(config.sample_rate);
        self.config = config;
        self.residual = Residual::default();
        self.buffers = Some(buffers);
        log::info!(
            "mixer enabled: {} Hz, {:?}, {:?}, {} buffer(s)",
            config.sample_rate,
            config.resolution,
            config.channels,
            config.buffer_count
        );
        Ok(())
    }

    /// Recompute rate-dependent voice state configured at another output rate.
    ///
    /// Filter coefficients are derived again from the stored cutoff and
    /// resonance, replacing any raw coefficients.
    fn retune(&mut self, sample_rate: u32) {
        for voice in self.voices.iter_mut() {
            if voice.patch.is_some() && !voice.flags.contains(VoiceFlags::SYNTH) {
                voice.retune(sample_rate);
            }
            let filter = &mut voice.filter;
            if filter.coeffs != FilterCoefficients::default() {
                filter.coeffs =
                    filter_coefficients(sample_rate, i32::from(filter.cutoff), i32::from(filter.resonance));
            }
        }
        log::debug!("voices retuned for {} Hz", sample_rate);
    }

    /// Release output resources.
    pub fn disable(&mut self) {
        debug_assert!(self.buffers.is_some(), "mixer disabled twice");
        if self.buffers.take().is_some() {
            log::info!("mixer disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn timing(&self) -> &ModuleTiming {
        &self.timing
    }

    /// Set module timing. A tick length change applies from the next rendered tick.
    pub fn set_timing(&mut self, timing: ModuleTiming) {
        self.timing = timing;
    }

    pub fn set_tempo(&mut self, tempo: u32) {
        self.timing.tempo = tempo;
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Clamp a requested voice count to what the mixer can play.
    pub fn voice_limit(&self, requested: usize) -> usize {
        requested.min(self.voices.len())
    }

    pub fn voice(&self, voc: usize) -> Option<&Voice> {
        self.voices.get(voc)
    }

    /// Claim the first free voice for `channel`.
    pub fn allocate_voice(&mut self, channel: usize) -> Option<usize> {
        let voc = self.voices.iter().position(Voice::is_free)?;
        self.voices[voc].channel = Some(channel);
        Some(voc)
    }

    /// Free a voice. Its residual is faded out on the next tick.
    pub fn reset_voice(&mut self, voc: usize) {
        if let Some(voice) = self.voices.get_mut(voc) {
            scheduler::release_voice(voice, voc, &mut self.residual, self.synth.as_mut());
        }
    }

    /// Add a patch to `bank`, rejecting sample patches without data.
    pub fn load_patch(&self, bank: &mut PatchBank, patch: Patch) -> Result<PatchKey, MixerError> {
        if !patch.is_synth() && patch.is_empty() {
            log::warn!("rejecting empty patch {:?}", patch.name.as_str());
            return Err(MixerError::EmptyPatch);
        }
        Ok(bank.insert(patch))
    }

    /// Bind a patch to a voice. The voice starts silent at position 0.
    pub fn set_patch(&mut self, voc: usize, bank: &PatchBank, key: PatchKey) {
        let Some(patch) = bank.get(key) else {
            log::warn!("voice {}: unknown patch", voc);
            return;
        };
        if voc >= self.voices.len() {
            return;
        }
        let stereo = self.config.channels.is_stereo();

        self.set_volume(voc, 0);
        let voice = &mut self.voices[voc];
        if voice.flags.contains(VoiceFlags::SYNTH) {
            self.synth.reset(voc);
        }
        voice.patch = Some(key);
        voice.pan = if stereo { patch.panning } else { 0 };
        voice.flags = VoiceFlags::empty();
        voice.state = PlayState::Playing;

        if let PatchData::Synth(data) = &patch.data {
            voice.flags |= VoiceFlags::SYNTH;
            self.synth.set_patch(voc, data);
            return;
        }

        if self.timing.interpolate {
            voice.flags |= VoiceFlags::INTERPOLATE;
        }
        if patch.is_16bit() {
            voice.flags |= VoiceFlags::WIDE;
        }
        if self.timing.filter {
            voice.flags |= VoiceFlags::FILTER;
        }
        voice.boundary = Boundary::for_loop(patch.loop_mode);
        let (start, end) = patch.loop_bounds();
        voice.loop_start = start as i32;
        voice.loop_end = end as i32;

        self.set_position(voc, bank, 0, 0);
    }

    /// Set the note of a voice, recomputing its period and pitch base.
    pub fn set_note(&mut self, voc: usize, bank: &PatchBank, note: i32) {
        let rate = self.config.sample_rate;
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        voice.note = note;
        voice.period = note_to_period(note, 0);
        if let Some(patch) = voice.patch.and_then(|key| bank.get(key)) {
            voice.base_freq = patch.base_freq;
            voice.base_note = patch.base_note;
            voice.retune(rate);
        }
        if voice.flags.contains(VoiceFlags::SYNTH) {
            self.synth.set_note(voc, note, 0);
        }
    }

    /// Bend the current note by `bend` cents.
    pub fn set_bend(&mut self, voc: usize, bend: i32) {
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        voice.period = note_to_period(voice.note, bend);
        if voice.flags.contains(VoiceFlags::SYNTH) {
            self.synth.set_note(voc, voice.note, bend);
        }
    }

    /// Set volume (clamped to 0-255). The part of the voice's last output
    /// that the change removes is faded out on the next tick.
    pub fn set_volume(&mut self, voc: usize, volume: i32) {
        let enabled = self.buffers.is_some();
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        let volume = volume.clamp(0, 255) as u8;
        if enabled {
            voice.residual.fold(voice.volume, voice.pan, volume, voice.pan);
            self.residual.absorb(core::mem::take(&mut voice.residual));
        }
        voice.volume = volume;
    }

    /// Set pan (clamped to -128..=127), with the same fade as [`set_volume`](Self::set_volume).
    ///
    /// Mono output always plays at center pan.
    pub fn set_pan(&mut self, voc: usize, pan: i32) {
        let enabled = self.buffers.is_some();
        let stereo = self.config.channels.is_stereo();
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        let pan = if stereo { pan.clamp(-128, 127) as i8 } else { 0 };
        if enabled {
            voice.residual.fold(voice.volume, voice.pan, voice.volume, pan);
            self.residual.absorb(core::mem::take(&mut voice.residual));
        }
        voice.pan = pan;
    }

    pub fn set_effect(&mut self, voc: usize, effect: Effect) {
        let rate = self.config.sample_rate;
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        let filter = &mut voice.filter;
        match effect {
            Effect::Cutoff(value) => {
                filter.cutoff = value.clamp(0, 255) as u8;
                filter.coeffs = filter_coefficients(rate, value, i32::from(filter.resonance));
            }
            Effect::Resonance(value) => {
                filter.resonance = value.clamp(0, 255) as u8;
                filter.coeffs = filter_coefficients(rate, i32::from(filter.cutoff), value);
            }
            Effect::FilterB0(value) => filter.coeffs.gain = value,
            Effect::FilterB1(value) => filter.coeffs.fb0 = value,
            Effect::FilterB2(value) => filter.coeffs.fb1 = value,
        }
    }

    /// Move a sample voice to `pos` frames plus `frac` (16.16 fraction).
    ///
    /// Positions outside the playable range restart from 0. A voice moving
    /// backward through a ping-pong loop is turned forward again.
    pub fn set_position(&mut self, voc: usize, bank: &PatchBank, pos: i32, frac: i32) {
        let Some(voice) = self.voices.get_mut(voc) else {
            return;
        };
        let Some(patch) = voice.patch.and_then(|key| bank.get(key)) else {
            return;
        };
        if patch.is_synth() {
            return;
        }
        let end = patch.playable_end() as i32;
        voice.pos = if (0..end).contains(&pos) { pos } else { 0 };
        voice.frac = frac & crate::fixed::SMIX_MASK;
        voice.end = end;
        if voice.state == PlayState::ReverseLoop {
            voice.state = PlayState::Playing;
        }
    }

    /// Render the next tick and return the converted output buffer.
    ///
    /// # Panics
    ///
    /// Panics if the mixer is not enabled.
    pub fn render_next_tick(&mut self, bank: &PatchBank) -> Tick<'_> {
        let Some(buffers) = self.buffers.as_mut() else {
            panic!("render_next_tick called on a disabled mixer");
        };
        buffers.set_tick_frames(tick_frames(self.config.sample_rate, &self.timing));
        let stereo = self.config.channels.is_stereo();
        let voices = &mut self.voices;
        let residual = &mut self.residual;
        let synth = self.synth.as_mut();

        {
            let acc = buffers.accumulator_mut();
            #[cfg(feature = "alloc_check")]
            assert_no_alloc::assert_no_alloc(|| scheduler::mix_tick(voices, bank, acc, stereo, residual, synth));
            #[cfg(not(feature = "alloc_check"))]
            scheduler::mix_tick(voices, bank, acc, stereo, residual, synth);
        }

        let format = OutputFormat { resolution: self.config.resolution, unsigned: self.config.unsigned };
        buffers.produce(format)
    }

    /// Bytes produced by the next call to [`render_next_tick`](Self::render_next_tick),
    /// or 0 when disabled.
    pub fn tick_bytes(&self) -> usize {
        self.buffers.as_ref().map_or(0, |b| {
            let frames = tick_frames(self.config.sample_rate, &self.timing).min(b.max_tick_frames());
            frames * b.channels() * self.config.resolution.bytes_per_sample()
        })
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(DEFAULT_VOICES)
    }
}
