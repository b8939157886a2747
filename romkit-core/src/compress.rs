//! Compression schemes found in cartridge data.
//!
//! # Tail-window LZ
//! ```text
//! u16 LE   length of the command stream
//! commands ...
//! literals ...
//! ```
//! Each command byte is processed low nibble first:
//! - low nibble `n`: copy `n` bytes from the literal pool
//! - high nibble `h`: read one more command byte `d`, then copy `h + 2` bytes from
//!   `output[len - (d + 1)]`, byte by byte so the copy may overlap itself
//!
//! A zero command ends the stream.
//!
//! # Packed 3bpp tiles
//! 24-byte tiles stored without the empty fourth plane. Expanding inserts a zero after
//! every byte of the third plane, giving the 32-byte 4bpp layout.

use crate::error::{RomError, RomResult};
use log::debug;

/// Largest back-reference distance.
pub const WINDOW: usize = 256;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 17;
const MAX_LITERALS: usize = 15;

const PACKED_TILE: usize = 24;
const EXPANDED_TILE: usize = 32;
/// Bytes of each tile holding the first two planes.
const LOW_PLANES: usize = 16;

fn corrupt(offset: usize, message: impl Into<String>) -> RomError {
    RomError::Decompression {
        offset,
        message: message.into(),
    }
}

/// Decompress one tail-window LZ stream.
///
/// # Errors
/// `Decompression` when a command reads past the literal pool, references output that
/// does not exist yet, or the command stream has no terminator.
pub fn decompress(source: &[u8]) -> RomResult<Vec<u8>> {
    if source.len() < 2 {
        return Err(corrupt(0, "missing command-stream length"));
    }
    let commands_end: usize = 2 + u16::from_le_bytes([source[0], source[1]]) as usize;
    if commands_end > source.len() {
        return Err(corrupt(0, format!("command stream runs to 0x{:X}, past the input", commands_end)));
    }
    let mut cmd: usize = 2;
    let mut literal: usize = commands_end;
    let mut output: Vec<u8> = Vec::with_capacity(source.len() * 2);

    loop {
        if cmd >= commands_end {
            return Err(corrupt(cmd, "command stream has no terminator"));
        }
        let command: u8 = source[cmd];
        cmd += 1;
        if command == 0 {
            break;
        }

        let count: usize = (command & 0x0F) as usize;
        if count > 0 {
            let bytes: &[u8] = source
                .get(literal..literal + count)
                .ok_or_else(|| corrupt(cmd - 1, "literal pool exhausted"))?;
            output.extend_from_slice(bytes);
            literal += count;
        }

        let high: usize = (command >> 4) as usize;
        if high > 0 {
            if cmd >= commands_end {
                return Err(corrupt(cmd - 1, "back-reference missing its distance byte"));
            }
            let distance: usize = source[cmd] as usize + 1;
            cmd += 1;
            let mut from: usize = output
                .len()
                .checked_sub(distance)
                .ok_or_else(|| corrupt(cmd - 2, format!("back-reference {} bytes before the output start", distance)))?;
            for _ in 0..high + 2 {
                let byte: u8 = output[from];
                output.push(byte);
                from += 1;
            }
        }
    }

    debug!("Decompressed {} bytes into {}", source.len(), output.len());
    Ok(output)
}

/// Longest match for `data[pos..]` within the window, as `(length, distance)`.
fn find_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let limit: usize = MAX_MATCH.min(data.len() - pos);
    if limit < MIN_MATCH {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for distance in 1..=WINDOW.min(pos) {
        let from: usize = pos - distance;
        let len: usize = (0..limit).take_while(|&k| data[from + k] == data[pos + k]).count();
        if len >= MIN_MATCH && best.map_or(true, |(best_len, _)| len > best_len) {
            best = Some((len, distance));
            if len == limit {
                break;
            }
        }
    }
    best
}

/// Greedy tail-window LZ compression; the inverse of [`decompress`].
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut commands: Vec<u8> = Vec::new();
    let mut literals: Vec<u8> = Vec::new();
    let mut pending: usize = 0;
    let mut pos: usize = 0;

    while pos < data.len() {
        match find_match(data, pos) {
            Some((len, distance)) => {
                commands.push((((len - 2) << 4) | pending) as u8);
                commands.push((distance - 1) as u8);
                pending = 0;
                pos += len;
            }
            None => {
                if pending == MAX_LITERALS {
                    commands.push(pending as u8);
                    pending = 0;
                }
                literals.push(data[pos]);
                pending += 1;
                pos += 1;
            }
        }
    }
    if pending > 0 {
        commands.push(pending as u8);
    }
    commands.push(0);

    let mut out: Vec<u8> = Vec::with_capacity(2 + commands.len() + literals.len());
    out.extend_from_slice(&(commands.len() as u16).to_le_bytes());
    out.extend_from_slice(&commands);
    out.extend_from_slice(&literals);
    out
}

/// Expand packed 3bpp tiles to the 4bpp layout.
pub fn expand_3bpp_to_4bpp(packed: &[u8]) -> RomResult<Vec<u8>> {
    if packed.len() % PACKED_TILE != 0 {
        return Err(corrupt(
            packed.len(),
            format!("packed tile data must be a multiple of {} bytes", PACKED_TILE),
        ));
    }
    let mut out: Vec<u8> = Vec::with_capacity(packed.len() / PACKED_TILE * EXPANDED_TILE);
    for tile in packed.chunks_exact(PACKED_TILE) {
        out.extend_from_slice(&tile[..LOW_PLANES]);
        for &byte in &tile[LOW_PLANES..] {
            out.push(byte);
            out.push(0);
        }
    }
    Ok(out)
}

/// Pack 4bpp tiles whose fourth plane is empty.
///
/// # Errors
/// `Decompression` if the length is not whole tiles or a fourth-plane byte is set.
pub fn pack_4bpp_to_3bpp(expanded: &[u8]) -> RomResult<Vec<u8>> {
    if expanded.len() % EXPANDED_TILE != 0 {
        return Err(corrupt(
            expanded.len(),
            format!("tile data must be a multiple of {} bytes", EXPANDED_TILE),
        ));
    }
    let mut out: Vec<u8> = Vec::with_capacity(expanded.len() / EXPANDED_TILE * PACKED_TILE);
    for (n, tile) in expanded.chunks_exact(EXPANDED_TILE).enumerate() {
        out.extend_from_slice(&tile[..LOW_PLANES]);
        for (row, pair) in tile[LOW_PLANES..].chunks_exact(2).enumerate() {
            if pair[1] != 0 {
                return Err(corrupt(
                    n * EXPANDED_TILE + LOW_PLANES + row * 2 + 1,
                    "fourth bitplane is not empty",
                ));
            }
            out.push(pair[0]);
        }
    }
    Ok(out)
}

/// Split each byte into two 3-bit palette indices, low nibble first.
pub fn expand_nibbles(packed: &[u8]) -> Vec<u8> {
    packed.iter().flat_map(|&b| [b & 0x07, (b >> 4) & 0x07]).collect()
}

/// Inverse of [`expand_nibbles`]; bits above the low three of each index are dropped.
pub fn pack_nibbles(indices: &[u8]) -> RomResult<Vec<u8>> {
    if indices.len() % 2 != 0 {
        return Err(corrupt(indices.len(), "nibble data must have an even length"));
    }
    Ok(indices
        .chunks_exact(2)
        .map(|pair| (pair[0] & 0x07) | ((pair[1] & 0x07) << 4))
        .collect())
}
