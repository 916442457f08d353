//! Fixed-point software mixer for tracker module playback.
//!
//! Renders active voices into a 32-bit accumulator once per tick, then
//! converts the tick into one of a ring of output buffers.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod anticlick;
mod buffer;
pub mod config;
mod error;
pub mod filter;
pub mod fixed;
pub mod frequency;
pub mod kernel;
mod mixer;
pub mod output;
pub mod scheduler;
pub mod synth;
pub mod voice;

pub use anticlick::Residual;
pub use buffer::{tick_frames, BufferManager, Tick};
pub use config::{ChannelMode, MixerConfig, ModuleTiming, Resolution, TimingMode};
pub use error::MixerError;
pub use filter::{filter_coefficients, FilterCoefficients};
pub use mixer::{Effect, Mixer, DEFAULT_VOICES};
pub use output::OutputFormat;
pub use synth::{NullSynth, SquareSynth, Synth};
pub use voice::{Boundary, PlayState, Voice, VoiceFlags};
