//! File formats for the smix software mixer.
//!
//! Loads WAV files into patches and writes rendered ticks back out as WAV.

mod wav;

pub use wav::{load_wav, pcm_to_wav, write_wav, WavSpec};

/// Error type for format parsing and writing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Readable container holding data we can't decode
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Output encoding the container can't represent
    #[error("WAV cannot store {0}")]
    UnsupportedEncoding(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
