//! Accumulator and output buffer ring.

use alloc::vec::Vec;

use crate::config::{ModuleTiming, TimingMode};
use crate::error::MixerError;
use crate::fixed::{MAX_SAMPLE_BYTES, OUT_MAXLEN};
use crate::output::{self, OutputFormat};

/// Frames in one tick at `sample_rate` for the given module timing.
///
/// Tempo 0 is treated as 1. The result is not clamped to buffer capacity.
pub fn tick_frames(sample_rate: u32, timing: &ModuleTiming) -> usize {
    let rate = u64::from(sample_rate);
    let replay = u64::from(timing.replay_rate);
    let tempo = u64::from(timing.tempo.max(1));
    let frames = match timing.mode {
        TimingMode::Standard => rate * replay / tempo / 100,
        TimingMode::MedBpm => rate * replay * 33 / tempo / 12500,
    };
    usize::try_from(frames).unwrap_or(usize::MAX)
}

/// A produced tick: which ring slot was written, and its bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Tick<'a> {
    pub slot: usize,
    pub bytes: &'a [u8],
}

/// Owns the 32-bit accumulator and the ring of converted output buffers.
///
/// Everything is allocated up front; producing a tick never allocates.
#[derive(Debug)]
pub struct BufferManager {
    accumulator: Vec<i32>,
    ring: Vec<Vec<u8>>,
    current: usize,
    channels: usize,
    tick_frames: usize,
}

impl BufferManager {
    /// Allocate `buffer_count` (at least 1) output buffers plus the accumulator.
    pub fn new(buffer_count: usize, channels: usize, tick_frames: usize) -> Result<Self, MixerError> {
        let buffer_count = buffer_count.max(1);
        let accumulator = zeroed::<i32>(OUT_MAXLEN, "accumulator")?;

        let mut ring = Vec::new();
        ring.try_reserve_exact(buffer_count).map_err(|_| MixerError::Allocation {
            what: "buffer ring",
            bytes: buffer_count * core::mem::size_of::<Vec<u8>>(),
        })?;
        for _ in 0..buffer_count {
            ring.push(zeroed::<u8>(OUT_MAXLEN * MAX_SAMPLE_BYTES, "output buffer")?);
        }

        let channels = channels.max(1);
        Ok(Self {
            accumulator,
            ring,
            current: 0,
            channels,
            tick_frames: tick_frames.min(OUT_MAXLEN / channels),
        })
    }

    pub fn buffer_count(&self) -> usize {
        self.ring.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames in the tick currently being mixed.
    pub fn tick_frames(&self) -> usize {
        self.tick_frames
    }

    /// Largest tick the accumulator can hold.
    pub fn max_tick_frames(&self) -> usize {
        OUT_MAXLEN / self.channels
    }

    /// Accumulator region for the current tick.
    pub fn accumulator_mut(&mut self) -> &mut [i32] {
        let len = self.tick_frames * self.channels;
        &mut self.accumulator[..len]
    }

    /// Ring slot most recently returned by [`produce`](Self::produce).
    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.ring.get(index).map(Vec::as_slice)
    }

    /// Size the accumulator for the next tick, clamped to capacity.
    pub fn set_tick_frames(&mut self, frames: usize) {
        self.tick_frames = frames.min(self.max_tick_frames());
    }

    /// Convert the accumulated tick into the next ring slot and clear the
    /// accumulator.
    pub fn produce(&mut self, format: OutputFormat) -> Tick<'_> {
        let used = self.tick_frames * self.channels;
        self.current = (self.current + 1) % self.ring.len();

        let written = output::convert(format, &self.accumulator[..used], &mut self.ring[self.current]);
        self.accumulator[..used].fill(0);

        Tick { slot: self.current, bytes: &self.ring[self.current][..written] }
    }
}

fn zeroed<T: Clone + Default>(len: usize, what: &'static str) -> Result<Vec<T>, MixerError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| {
        log::warn!("failed to allocate {}", what);
        MixerError::Allocation { what, bytes: len * core::mem::size_of::<T>() }
    })?;
    buf.resize(len, T::default());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    const FMT16: OutputFormat = OutputFormat { resolution: Resolution::Bits16, unsigned: false };

    #[test]
    fn standard_tick_length() {
        assert_eq!(tick_frames(44100, &ModuleTiming::default()), 882);
        let fast = ModuleTiming { tempo: 250, ..ModuleTiming::default() };
        assert_eq!(tick_frames(44100, &fast), 441);
    }

    #[test]
    fn med_bpm_tick_length() {
        let med = ModuleTiming { mode: TimingMode::MedBpm, ..ModuleTiming::default() };
        assert_eq!(tick_frames(44100, &med), 232);
    }

    #[test]
    fn zero_tempo_does_not_divide_by_zero() {
        let t = ModuleTiming { tempo: 0, ..ModuleTiming::default() };
        assert_eq!(tick_frames(8000, &t), 8000 * 250 / 100);
    }

    #[test]
    fn ring_rotates_with_period_n() {
        let mut buffers = BufferManager::new(3, 2, 100).expect("allocation");
        let slots: alloc::vec::Vec<usize> = (0..7).map(|_| buffers.produce(FMT16).slot).collect();
        assert_eq!(slots, [1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn single_buffer_always_returns_slot_zero() {
        let mut buffers = BufferManager::new(0, 2, 100).expect("allocation");
        assert_eq!(buffers.buffer_count(), 1);
        assert_eq!(buffers.produce(FMT16).slot, 0);
        assert_eq!(buffers.produce(FMT16).slot, 0);
    }

    #[test]
    fn produced_length_matches_tick_size() {
        let mut buffers = BufferManager::new(2, 2, 882).expect("allocation");
        assert_eq!(buffers.produce(FMT16).bytes.len(), 882 * 2 * 2);
        buffers.set_tick_frames(441);
        assert_eq!(buffers.produce(FMT16).bytes.len(), 441 * 2 * 2);
    }

    #[test]
    fn accumulator_is_cleared_after_produce() {
        let mut buffers = BufferManager::new(2, 1, 10).expect("allocation");
        buffers.accumulator_mut().fill(1 << 20);
        let tick = buffers.produce(FMT16);
        assert!(tick.bytes.iter().any(|&b| b != 0));
        buffers.set_tick_frames(20);
        assert_eq!(buffers.accumulator_mut().len(), 20);
        assert!(buffers.accumulator_mut().iter().all(|&v| v == 0));
    }

    #[test]
    fn oversized_tick_is_clamped() {
        let mut buffers = BufferManager::new(1, 2, 1_000_000).expect("allocation");
        assert_eq!(buffers.tick_frames(), OUT_MAXLEN / 2);
        buffers.set_tick_frames(usize::MAX);
        assert_eq!(buffers.tick_frames(), OUT_MAXLEN / 2);
    }
}
