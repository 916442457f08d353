//! smix CLI: render a note on a WAV patch through the mixer.
//!
//! Usage:
//!   smix patch.wav --out out.wav
//!   smix patch.wav --out out.wav --note 60 --ticks 100 --loop pingpong --cutoff 80

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use smix_engine::{ChannelMode, Effect, Mixer, MixerConfig, ModuleTiming, Resolution};
use smix_formats::{load_wav, write_wav, WavSpec};
use smix_ir::{LoopMode, PatchBank};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LoopArg {
    /// Keep the loop stored in the file
    Keep,
    None,
    Forward,
    Pingpong,
}

#[derive(Parser, Debug)]
#[command(name = "smix")]
#[command(about = "Render a sample through the smix software mixer")]
struct Args {
    /// Patch to play (8/16-bit PCM WAV)
    patch: PathBuf,

    /// Output WAV file
    #[arg(long, short)]
    out: PathBuf,

    /// Note to play (48 = the patch's base pitch)
    #[arg(long, default_value_t = 48, allow_negative_numbers = true)]
    note: i32,

    /// Pitch bend in cents
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    bend: i32,

    /// Number of ticks to render
    #[arg(long, default_value_t = 250)]
    ticks: usize,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    rate: u32,

    /// Output bits: 0 for mu-law, 8 or 16
    #[arg(long, default_value_t = 16)]
    bits: u8,

    /// Render a single output channel
    #[arg(long)]
    mono: bool,

    /// Loop mode override
    #[arg(long = "loop", value_enum, default_value_t = LoopArg::Keep)]
    loop_mode: LoopArg,

    /// Loop start in frames (with --loop)
    #[arg(long)]
    loop_start: Option<u32>,

    /// Loop end in frames (with --loop)
    #[arg(long)]
    loop_end: Option<u32>,

    /// Filter cutoff 0-255; enables the resonant filter
    #[arg(long)]
    cutoff: Option<i32>,

    /// Filter resonance 0-255
    #[arg(long, default_value_t = 0)]
    resonance: i32,

    /// Tempo in BPM
    #[arg(long, default_value_t = 125)]
    tempo: u32,

    /// Voice volume 0-255
    #[arg(long, default_value_t = 64)]
    volume: i32,

    /// Pan -128 (right) to 127 (left)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pan: i32,

    /// Disable interpolation
    #[arg(long)]
    no_interp: bool,

    /// Output buffers in the ring
    #[arg(long, default_value_t = 2)]
    buffers: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let pcm = render(&args)?;

    let resolution = Resolution::from_bits(args.bits);
    let spec = WavSpec {
        format: smix_engine::OutputFormat { resolution, unsigned: resolution == Resolution::Bits8 },
        channels: if args.mono { 1 } else { 2 },
        sample_rate: args.rate,
    };
    let mut file = fs::File::create(&args.out).with_context(|| format!("failed to create {}", args.out.display()))?;
    write_wav(&mut file, &pcm, &spec).with_context(|| format!("failed to write {}", args.out.display()))?;

    info!("wrote {} bytes of audio to {}", pcm.len(), args.out.display());
    Ok(())
}

/// Render the requested ticks and return the concatenated output bytes.
fn render(args: &Args) -> Result<Vec<u8>> {
    let data = fs::read(&args.patch).with_context(|| format!("failed to read {}", args.patch.display()))?;
    let name = args.patch.file_stem().and_then(|s| s.to_str()).unwrap_or("patch");
    let mut patch = load_wav(&data, name).with_context(|| format!("failed to parse {}", args.patch.display()))?;
    info!("patch {:?}: {} frames at {} Hz", name, patch.len(), patch.base_freq);

    let mode = match args.loop_mode {
        LoopArg::Keep => None,
        LoopArg::None => Some(LoopMode::None),
        LoopArg::Forward => Some(LoopMode::Forward),
        LoopArg::Pingpong => Some(LoopMode::PingPong),
    };
    if let Some(mode) = mode {
        patch.loop_mode = mode;
        patch.loop_start = args.loop_start.unwrap_or(0);
        patch.loop_end = args.loop_end.unwrap_or(patch.len() as u32);
    }

    let resolution = Resolution::from_bits(args.bits);
    let config = MixerConfig::default()
        .with_sample_rate(args.rate)
        .with_buffer_count(args.buffers)
        .with_resolution(resolution)
        .with_channels(if args.mono { ChannelMode::Mono } else { ChannelMode::Stereo })
        .with_unsigned(resolution == Resolution::Bits8);
    if config.sanitized().sample_rate != args.rate {
        bail!("sample rate {} is out of range", args.rate);
    }

    let mut bank = PatchBank::with_key();
    let mut mixer = Mixer::new(1);
    mixer.set_timing(ModuleTiming {
        tempo: args.tempo,
        interpolate: !args.no_interp,
        filter: args.cutoff.is_some(),
        ..ModuleTiming::default()
    });
    mixer.enable(config).context("failed to enable mixer")?;

    let key = mixer.load_patch(&mut bank, patch).context("failed to load patch")?;
    let voc = mixer.allocate_voice(0).context("no free voice")?;
    mixer.set_patch(voc, &bank, key);
    mixer.set_note(voc, &bank, args.note);
    mixer.set_bend(voc, args.bend);
    mixer.set_volume(voc, args.volume);
    mixer.set_pan(voc, args.pan);
    if let Some(cutoff) = args.cutoff {
        mixer.set_effect(voc, Effect::Resonance(args.resonance));
        mixer.set_effect(voc, Effect::Cutoff(cutoff));
    }

    let mut pcm = Vec::with_capacity(args.ticks * mixer.tick_bytes());
    for _ in 0..args.ticks {
        pcm.extend_from_slice(mixer.render_next_tick(&bank).bytes);
    }
    mixer.disable();
    Ok(pcm)
}
