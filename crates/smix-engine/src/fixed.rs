//! Fixed-point scale constants shared by the mixing path.
//!
//! Changing any of these changes the rendered output bit pattern.

/// Fractional bits of voice positions and increments (16.16).
pub const SMIX_SHIFT: u32 = 16;

/// Mask selecting the fractional part of a position.
pub const SMIX_MASK: i32 = (1 << SMIX_SHIFT) - 1;

/// Fractional bits of the resonant filter coefficients.
pub const FILTER_SHIFT: u32 = 16;

/// Headroom bits in the accumulator, removed by the output converter.
pub const LIM_FT: u32 = 12;

/// Right shift applied to `volume * (PAN_CENTER ± pan)` to form a channel gain.
pub const GAIN_SHIFT: u32 = 4;

/// Pan offset added to the signed pan value when forming channel gains.
pub const PAN_CENTER: i32 = 0x80;

/// Largest accepted per-sample increment. Keeps `frac + increment` inside `i32`.
pub const MAX_INCREMENT: i32 = i32::MAX >> 1;

/// Accumulator capacity in samples (frames × channels).
pub const OUT_MAXLEN: usize = 64000;

/// Widest output sample in bytes.
pub const MAX_SAMPLE_BYTES: usize = 2;
