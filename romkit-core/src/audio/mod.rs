//! Audio sample codec and WAV export.

pub mod brr;
pub mod wav;

pub use brr::{AudioCodec, BrrHeader, BrrSample, BLOCK_SIZE, SAMPLES_PER_BLOCK};
pub use wav::{write_wav, write_wav_to, DSP_SAMPLE_RATE};
