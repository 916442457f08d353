//! Output converters: accumulator samples to device bytes.
//!
//! The accumulator carries `LIM_FT` bits of headroom above the 16-bit scale.
//! Each converter strips the headroom (and any extra precision), clamps to
//! the output range, and optionally applies an unsigned offset.

use crate::config::Resolution;
use crate::fixed::LIM_FT;

const LIM8_HI: i32 = 127;
const LIM8_LO: i32 = -127;
const LIM12_HI: i32 = 4095;
const LIM12_LO: i32 = -4096;
const LIM16_HI: i32 = 32767;
const LIM16_LO: i32 = -32768;

/// Encoding of produced buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputFormat {
    pub resolution: Resolution,
    /// Offset samples to unsigned (ignored for μ-law)
    pub unsigned: bool,
}

/// Convert `src` into `dest`, returning the number of bytes written.
///
/// `dest` must hold `src.len() * bytes_per_sample` bytes; extra source
/// samples are ignored if it doesn't.
pub fn convert(format: OutputFormat, src: &[i32], dest: &mut [u8]) -> usize {
    match format.resolution {
        Resolution::Bits8 => out_su8(src, dest, format.unsigned),
        Resolution::Bits16 => out_su16(src, dest, format.unsigned),
        Resolution::Ulaw => out_ulaw(src, dest),
    }
}

fn out_su8(src: &[i32], dest: &mut [u8], unsigned: bool) -> usize {
    let offset = if unsigned { 0x80 } else { 0 };
    let mut written = 0;
    for (byte, &acc) in dest.iter_mut().zip(src) {
        let smp = (acc >> (LIM_FT + 8)).clamp(LIM8_LO, LIM8_HI);
        *byte = (smp + offset) as u8;
        written += 1;
    }
    written
}

/// 16-bit samples are written in native byte order.
fn out_su16(src: &[i32], dest: &mut [u8], unsigned: bool) -> usize {
    let offset = if unsigned { 0x8000 } else { 0 };
    let mut written = 0;
    for (bytes, &acc) in dest.chunks_exact_mut(2).zip(src) {
        let smp = (acc >> LIM_FT).clamp(LIM16_LO, LIM16_HI);
        bytes.copy_from_slice(&((smp + offset) as u16).to_ne_bytes());
        written += 2;
    }
    written
}

fn out_ulaw(src: &[i32], dest: &mut [u8]) -> usize {
    let mut written = 0;
    for (byte, &acc) in dest.iter_mut().zip(src) {
        let smp = (acc >> (LIM_FT + 4)).clamp(LIM12_LO, LIM12_HI);
        *byte = ulaw_encode(smp);
        written += 1;
    }
    written
}

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;
const SEG_END: [i32; 8] = [0xff, 0x1ff, 0x3ff, 0x7ff, 0xfff, 0x1fff, 0x3fff, 0x7fff];

/// G.711 μ-law encode a 13-bit signed sample.
pub fn ulaw_encode(sample: i32) -> u8 {
    let pcm = sample << 3;
    let (magnitude, mask) = if pcm < 0 { (-pcm, 0x7f) } else { (pcm, 0xff) };
    let biased = magnitude.min(ULAW_CLIP) + ULAW_BIAS;

    let code = match SEG_END.iter().position(|&end| biased <= end) {
        Some(seg) => ((seg as i32) << 4) | ((biased >> (seg + 3)) & 0xf),
        None => 0x7f,
    };
    (code ^ mask) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn fmt(resolution: Resolution, unsigned: bool) -> OutputFormat {
        OutputFormat { resolution, unsigned }
    }

    #[test]
    fn eight_bit_clamps_to_range() {
        let src = [200 << 20, -(200 << 20), 5 << 20];
        let mut dest = vec![0u8; 3];
        assert_eq!(convert(fmt(Resolution::Bits8, false), &src, &mut dest), 3);
        assert_eq!(dest, vec![127u8, (-127i8) as u8, 5]);
        convert(fmt(Resolution::Bits8, true), &src, &mut dest);
        assert_eq!(dest, vec![255u8, 1, 133]);
    }

    #[test]
    fn sixteen_bit_clamps_to_range() {
        let src = [40000 << 12, -40000 << 12, 1234 << 12];
        let mut dest = vec![0u8; 6];
        assert_eq!(convert(fmt(Resolution::Bits16, false), &src, &mut dest), 6);
        let words: alloc::vec::Vec<i16> =
            dest.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])).collect();
        assert_eq!(words, vec![32767, -32768, 1234]);
    }

    #[test]
    fn sixteen_bit_unsigned_offsets_midpoint() {
        let src = [0, 40000 << 12, -40000 << 12];
        let mut dest = vec![0u8; 6];
        convert(fmt(Resolution::Bits16, true), &src, &mut dest);
        let words: alloc::vec::Vec<u16> =
            dest.chunks_exact(2).map(|b| u16::from_ne_bytes([b[0], b[1]])).collect();
        assert_eq!(words, vec![0x8000, 0xffff, 0x0000]);
    }

    #[test]
    fn ulaw_reference_points() {
        assert_eq!(ulaw_encode(0), 0xff);
        assert_eq!(ulaw_encode(4095), 0x80);
        assert_eq!(ulaw_encode(-4096), 0x00);
        assert_eq!(ulaw_encode(-1), 0x7e);
    }

    #[test]
    fn ulaw_ignores_unsigned_and_clamps() {
        let src = [i32::MAX, i32::MIN, 0];
        let mut a = vec![0u8; 3];
        let mut b = vec![0u8; 3];
        convert(fmt(Resolution::Ulaw, false), &src, &mut a);
        convert(fmt(Resolution::Ulaw, true), &src, &mut b);
        assert_eq!(a, b);
        assert_eq!(a, vec![0x80, 0x00, 0xff]);
    }

    #[test]
    fn short_destination_limits_output() {
        let src = [0i32; 8];
        let mut dest = vec![0u8; 4];
        assert_eq!(convert(fmt(Resolution::Bits16, false), &src, &mut dest), 4);
    }
}
