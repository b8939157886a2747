//! WAV export of decoded samples.

use crate::audio::brr::BrrSample;
use crate::error::{RomError, RomResult};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{Seek, Write};
use std::path::Path;

/// Native output rate of the sound DSP.
pub const DSP_SAMPLE_RATE: u32 = 32_000;

fn wav_error(err: hound::Error) -> RomError {
    match err {
        hound::Error::IoError(io) => RomError::Io(io),
        other => RomError::Media {
            message: format!("WAV encoding failed: {}", other),
        },
    }
}

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write mono 16-bit PCM to any seekable writer.
pub fn write_wav_to<W: Write + Seek>(writer: W, sample: &BrrSample, sample_rate: u32) -> RomResult<()> {
    let mut wav = WavWriter::new(writer, spec(sample_rate)).map_err(wav_error)?;
    for &s in &sample.samples {
        wav.write_sample(s).map_err(wav_error)?;
    }
    wav.finalize().map_err(wav_error)
}

/// Write mono 16-bit PCM to a file.
pub fn write_wav(path: &Path, sample: &BrrSample, sample_rate: u32) -> RomResult<()> {
    let mut wav = WavWriter::create(path, spec(sample_rate)).map_err(wav_error)?;
    for &s in &sample.samples {
        wav.write_sample(s).map_err(wav_error)?;
    }
    wav.finalize().map_err(wav_error)
}
