//! Bit-rate-reduced (BRR) sample decoding.
//!
//! # Block Format
//! Each block is 9 bytes: a header byte `sssspfle` followed by 8 bytes holding 16 signed
//! 4-bit samples, high nibble first.
//! - **s**: left shift applied to each nibble (values above 12 behave as 12)
//! - **f**: prediction filter over the previous two output samples
//! - **l**: loop flag, meaningful on the final block
//! - **e**: end flag, terminates the stream
//!
//! Filter arithmetic is performed in 32 bits and clamped to 16-bit signed after every
//! sample; overflow is never an error.

use crate::error::{RomError, RomResult};
use log::debug;

/// Size of one encoded block.
pub const BLOCK_SIZE: usize = 9;
/// Samples produced by one block.
pub const SAMPLES_PER_BLOCK: usize = 16;
const MAX_SHIFT: u8 = 12;

/// Decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrrHeader {
    pub shift: u8,
    pub filter: u8,
    pub loop_flag: bool,
    pub end: bool,
}

impl BrrHeader {
    #[inline]
    pub fn parse(byte: u8) -> Self {
        Self {
            shift: byte >> 4,
            filter: (byte >> 2) & 0x03,
            loop_flag: byte & 0x02 != 0,
            end: byte & 0x01 != 0,
        }
    }
}

/// Prediction history carried between blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderState {
    prev1: i32,
    prev2: i32,
}

#[inline]
fn sign_extend(nibble: u8) -> i32 {
    if nibble < 8 {
        nibble as i32
    } else {
        nibble as i32 - 16
    }
}

#[inline]
fn apply_filter(filter: u8, s: i32, p1: i32, p2: i32) -> i32 {
    match filter {
        0 => s,
        1 => s + p1 + ((-p1) >> 4),
        2 => s + (p1 << 1) + ((-p1 * 3) >> 5) - p2 + (p2 >> 4),
        _ => s + (p1 << 1) + ((-p1 * 13) >> 6) - p2 + ((p2 * 3) >> 4),
    }
}

/// Decode one 9-byte block, updating `state`.
pub fn decode_block(block: &[u8; BLOCK_SIZE], state: &mut DecoderState) -> [i16; SAMPLES_PER_BLOCK] {
    let header: BrrHeader = BrrHeader::parse(block[0]);
    let shift: u8 = header.shift.min(MAX_SHIFT);
    let mut out: [i16; SAMPLES_PER_BLOCK] = [0i16; SAMPLES_PER_BLOCK];

    for (i, &byte) in block[1..].iter().enumerate() {
        for (j, nibble) in [byte >> 4, byte & 0x0F].into_iter().enumerate() {
            let s: i32 = sign_extend(nibble) << shift;
            let value: i32 = apply_filter(header.filter, s, state.prev1, state.prev2)
                .clamp(i16::MIN as i32, i16::MAX as i32);
            state.prev2 = state.prev1;
            state.prev1 = value;
            out[i * 2 + j] = value as i16;
        }
    }
    out
}

/// A decoded sample stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrrSample {
    pub samples: Vec<i16>,
    /// Number of blocks consumed.
    pub blocks: usize,
    /// The stream ended on a block with the end flag set.
    pub ended: bool,
    /// The final block also carried the loop flag.
    pub loops: bool,
    /// Sample index playback restarts from, when a loop offset was supplied.
    pub loop_start: Option<usize>,
}

impl BrrSample {
    /// Encoded length in bytes.
    pub fn byte_len(&self) -> usize {
        self.blocks * BLOCK_SIZE
    }
}

/// Stateless BRR decoder.
pub struct AudioCodec;

impl AudioCodec {
    /// Decode blocks from the start of `bytes` until an end flag.
    ///
    /// # Errors
    /// `TruncatedSample` if a block starts inside the buffer but runs past its end.
    pub fn decode_block_stream(bytes: &[u8]) -> RomResult<BrrSample> {
        Self::decode_block_stream_with_loop(bytes, None)
    }

    /// Decode blocks, also resolving a loop offset (bytes from the stream start, as stored
    /// in a sample directory) to a sample index.
    pub fn decode_block_stream_with_loop(
        bytes: &[u8],
        loop_offset: Option<usize>,
    ) -> RomResult<BrrSample> {
        let mut state: DecoderState = DecoderState::default();
        let mut samples: Vec<i16> = Vec::new();
        let mut blocks: usize = 0;
        let mut ended: bool = false;
        let mut loops: bool = false;
        let mut offset: usize = 0;

        while offset < bytes.len() {
            let Some(chunk) = bytes.get(offset..offset + BLOCK_SIZE) else {
                return Err(RomError::TruncatedSample {
                    offset,
                    blocks_decoded: blocks,
                });
            };
            let mut block: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            let header: BrrHeader = BrrHeader::parse(block[0]);
            samples.extend_from_slice(&decode_block(&block, &mut state));
            blocks += 1;
            offset += BLOCK_SIZE;
            if header.end {
                ended = true;
                loops = header.loop_flag;
                break;
            }
        }

        let loop_start: Option<usize> = loop_offset
            .filter(|&o| o % BLOCK_SIZE == 0 && o / BLOCK_SIZE < blocks)
            .map(|o| o / BLOCK_SIZE * SAMPLES_PER_BLOCK);
        debug!(
            "Decoded {} BRR blocks ({} samples, ended: {}, loops: {})",
            blocks,
            samples.len(),
            ended,
            loops
        );
        Ok(BrrSample {
            samples,
            blocks,
            ended,
            loops,
            loop_start,
        })
    }
}
