//! WAV encoding and decoding.

use crate::FormatError;
use smix_engine::{OutputFormat, Resolution};
use smix_ir::{LoopMode, Patch, PatchData, DEFAULT_BASE_NOTE};
use std::io::Write;

const FORMAT_PCM: u16 = 1;
const FORMAT_MULAW: u16 = 7;

/// MIDI note of middle C, which maps to the mixer's default base note.
const MIDI_MIDDLE_C: u32 = 60;

// --- Writing ---

/// Layout of rendered output bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavSpec {
    pub format: OutputFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavSpec {
    /// WAV format tag and bits per sample for this output format.
    fn encoding(&self) -> Result<(u16, u16), FormatError> {
        match (self.format.resolution, self.format.unsigned) {
            (Resolution::Ulaw, _) => Ok((FORMAT_MULAW, 8)),
            (Resolution::Bits8, true) => Ok((FORMAT_PCM, 8)),
            (Resolution::Bits8, false) => Err(FormatError::UnsupportedEncoding("signed 8-bit PCM")),
            (Resolution::Bits16, false) => Ok((FORMAT_PCM, 16)),
            (Resolution::Bits16, true) => Err(FormatError::UnsupportedEncoding("unsigned 16-bit PCM")),
        }
    }
}

/// Write mixer output bytes as a WAV file.
///
/// 16-bit input is in native byte order, as produced by the mixer, and is
/// stored little-endian.
pub fn write_wav(w: &mut impl Write, pcm: &[u8], spec: &WavSpec) -> Result<(), FormatError> {
    let (tag, bits) = spec.encoding()?;
    let block_align = spec.channels * (bits / 8);
    let fmt_size: u32 = if tag == FORMAT_PCM { 16 } else { 18 };
    let data_size = pcm.len() as u32;
    let pad = data_size % 2;

    w.write_all(b"RIFF")?;
    w.write_all(&(4 + 8 + fmt_size + 8 + data_size + pad).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&fmt_size.to_le_bytes())?;
    w.write_all(&tag.to_le_bytes())?;
    w.write_all(&spec.channels.to_le_bytes())?;
    w.write_all(&spec.sample_rate.to_le_bytes())?;
    w.write_all(&(spec.sample_rate * u32::from(block_align)).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits.to_le_bytes())?;
    if fmt_size == 18 {
        w.write_all(&0u16.to_le_bytes())?;
    }

    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    if bits == 16 {
        let le: Vec<u8> = pcm
            .chunks_exact(2)
            .flat_map(|c| u16::from_ne_bytes([c[0], c[1]]).to_le_bytes())
            .collect();
        w.write_all(&le)?;
    } else {
        w.write_all(pcm)?;
    }
    if pad != 0 {
        w.write_all(&[0])?;
    }
    Ok(())
}

pub fn pcm_to_wav(pcm: &[u8], spec: &WavSpec) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::with_capacity(pcm.len() + 46);
    write_wav(&mut buf, pcm, spec)?;
    Ok(buf)
}

// --- Reading ---

/// Load a PCM WAV file into a patch.
///
/// Stereo files are downmixed by averaging. The patch's base frequency is the
/// file's sample rate. Loop points and the unity note are taken from a `smpl`
/// chunk when present.
pub fn load_wav(data: &[u8], name: &str) -> Result<Patch, FormatError> {
    let header = parse_header(data)?;
    let end = (header.data_offset + header.data_size).min(data.len());
    let raw = data.get(header.data_offset..end).ok_or(FormatError::UnexpectedEof)?;

    let mut patch = Patch::new(name);
    patch.data = read_pcm_data(raw, &header);
    patch.base_freq = header.sample_rate;
    if let Some(sampler) = header.sampler {
        patch.base_note = DEFAULT_BASE_NOTE + sampler.unity_note as i32 - MIDI_MIDDLE_C as i32;
        if let Some((mode, start, end)) = sampler.first_loop {
            patch.loop_mode = mode;
            patch.loop_start = start;
            patch.loop_end = end;
        }
    }
    log::debug!("loaded {:?}: {} frames at {} Hz", name, patch.len(), patch.base_freq);
    Ok(patch)
}

struct SamplerInfo {
    unity_note: u32,
    first_loop: Option<(LoopMode, u32, u32)>,
}

struct WavHeader {
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
    sampler: Option<SamplerInfo>,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 44 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;
    let mut sampler = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4)? as usize;

        if chunk_id == b"fmt " && chunk_size >= 16 {
            let format = read_u16_le(data, pos + 8)?;
            if format != FORMAT_PCM {
                return Err(FormatError::UnsupportedFormat(format!("format tag {}", format)));
            }
            let channels = read_u16_le(data, pos + 10)?;
            let rate = read_u32_le(data, pos + 12)?;
            let bits = read_u16_le(data, pos + 22)?;
            fmt = Some((channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        } else if chunk_id == b"smpl" && chunk_size >= 36 {
            sampler = Some(parse_sampler(data, pos + 8, chunk_size)?);
        }

        pos = pos.saturating_add(8 + chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (num_channels, sample_rate, bits_per_sample) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    if bits_per_sample != 8 && bits_per_sample != 16 {
        return Err(FormatError::UnsupportedFormat(format!("{}-bit samples", bits_per_sample)));
    }
    if !(1..=2).contains(&num_channels) {
        return Err(FormatError::UnsupportedFormat(format!("{} channels", num_channels)));
    }

    Ok(WavHeader { num_channels, sample_rate, bits_per_sample, data_offset, data_size, sampler })
}

/// Sampler chunk: unity note at +12, loop count at +28, loop records of
/// 24 bytes from +36 (type at +4, start at +8, inclusive end at +12).
fn parse_sampler(data: &[u8], offset: usize, size: usize) -> Result<SamplerInfo, FormatError> {
    let unity_note = read_u32_le(data, offset + 12)?;
    let num_loops = read_u32_le(data, offset + 28)?;
    let first_loop = if num_loops > 0 && size >= 36 + 24 {
        let record = offset + 36;
        let mode = match read_u32_le(data, record + 4)? {
            1 => LoopMode::PingPong,
            _ => LoopMode::Forward,
        };
        let start = read_u32_le(data, record + 8)?;
        let end = read_u32_le(data, record + 12)?.saturating_add(1);
        Some((mode, start, end))
    } else {
        None
    };
    Ok(SamplerInfo { unity_note, first_loop })
}

fn read_pcm_data(raw: &[u8], header: &WavHeader) -> PatchData {
    match (header.bits_per_sample, header.num_channels) {
        (8, 1) => PatchData::from_unsigned8(raw),
        (8, _) => {
            let mono: Vec<u8> = raw
                .chunks_exact(2)
                .map(|c| ((u16::from(c[0]) + u16::from(c[1])) / 2) as u8)
                .collect();
            PatchData::from_unsigned8(&mono)
        }
        (_, 1) => PatchData::Pcm16(raw.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()),
        _ => PatchData::Pcm16(
            raw.chunks_exact(4)
                .map(|c| {
                    let l = i32::from(i16::from_le_bytes([c[0], c[1]]));
                    let r = i32::from(i16::from_le_bytes([c[2], c[3]]));
                    ((l + r) / 2) as i16
                })
                .collect(),
        ),
    }
}

fn read_u16_le(data: &[u8], offset: usize) -> Result<u16, FormatError> {
    let bytes = data.get(offset..offset + 2).ok_or(FormatError::UnexpectedEof)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32_le(data: &[u8], offset: usize) -> Result<u32, FormatError> {
    let bytes = data.get(offset..offset + 4).ok_or(FormatError::UnexpectedEof)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
