//! Internal Cartridge Header
//!
//! LoROM images carry a 64-byte descriptor ending at logical offset 0x8000. It names the
//! game, declares ROM and save-RAM sizes, and stores a 16-bit checksum of the whole image
//! together with its one's complement.

use crate::error::{check_span, RomResult};
use crate::rom::container::Container;
use log::debug;
use serde::Serialize;

/// Logical offset of the header in a LoROM image.
pub const HEADER_OFFSET: usize = 0x7FC0;
const TITLE_LEN: usize = 21;
const MAP_MODE_OFFSET: usize = 0x7FD5;
const COMPLEMENT_OFFSET: usize = 0x7FDC;
const CHECKSUM_OFFSET: usize = 0x7FDE;

/// Parsed internal header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalHeader {
    pub title: String,
    pub map_mode: u8,
    pub cartridge_type: u8,
    pub rom_size_code: u8,
    pub sram_size_code: u8,
    pub region: u8,
    pub developer: u8,
    pub version: u8,
    pub complement: u16,
    pub checksum: u16,
}

impl InternalHeader {
    /// Parse the header out of a logical image.
    pub fn parse(image: &[u8]) -> RomResult<Self> {
        check_span(HEADER_OFFSET, 0x40, image.len())?;
        let raw: &[u8] = &image[HEADER_OFFSET..HEADER_OFFSET + 0x40];
        let title: String = raw[..TITLE_LEN]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect::<String>()
            .trim_end()
            .to_string();
        let at = |offset: usize| image[offset];
        Ok(Self {
            title,
            map_mode: at(MAP_MODE_OFFSET),
            cartridge_type: at(0x7FD6),
            rom_size_code: at(0x7FD7),
            sram_size_code: at(0x7FD8),
            region: at(0x7FD9),
            developer: at(0x7FDA),
            version: at(0x7FDB),
            complement: u16::from_le_bytes([at(COMPLEMENT_OFFSET), at(COMPLEMENT_OFFSET + 1)]),
            checksum: u16::from_le_bytes([at(CHECKSUM_OFFSET), at(CHECKSUM_OFFSET + 1)]),
        })
    }

    /// Whether the map mode byte declares LoROM (low bit clear).
    pub fn is_lorom(&self) -> bool {
        self.map_mode & 0x01 == 0
    }

    /// Checksum and complement are each other's inverse.
    pub fn is_consistent(&self) -> bool {
        self.checksum ^ self.complement == 0xFFFF
    }

    /// Declared ROM size in bytes.
    pub fn rom_size(&self) -> Option<usize> {
        (self.rom_size_code < 16).then(|| 1024usize << self.rom_size_code)
    }

    /// Declared save-RAM size in bytes (0 when the cartridge has none).
    pub fn sram_size(&self) -> usize {
        match self.sram_size_code {
            0 => 0,
            code if code < 16 => 1024usize << code,
            _ => 0,
        }
    }

    pub fn region_name(&self) -> &'static str {
        match self.region {
            0x00 => "Japan",
            0x01 => "North America",
            0x02 => "Europe",
            0x03 => "Sweden/Scandinavia",
            0x06 => "France",
            0x07 => "Netherlands",
            0x08 => "Spain",
            0x09 => "Germany",
            0x0A => "Italy",
            0x0B => "China",
            0x0D => "Korea",
            _ => "Unknown",
        }
    }
}

/// Compute the header checksum of a logical image.
///
/// Images whose size is not a power of two are summed as if the tail were mirrored up to
/// the next power of two. The stored checksum/complement pair contributes the same amount
/// regardless of its value, so no masking is needed.
pub fn compute_checksum(image: &[u8]) -> u16 {
    let sum = |bytes: &[u8]| -> u32 { bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32)) };
    if image.is_empty() || image.len().is_power_of_two() {
        return sum(image) as u16;
    }
    let base: usize = 1usize << (usize::BITS - 1 - image.len().leading_zeros());
    let tail: &[u8] = &image[base..];
    let repeats: u32 = (base / tail.len()) as u32;
    sum(&image[..base])
        .wrapping_add(sum(tail).wrapping_mul(repeats)) as u16
}

/// Recompute the header checksum and write it back. Returns the new checksum.
pub fn fix_checksum(container: &mut Container) -> RomResult<u16> {
    // A consistent pair sums to 0x1FE, so seed one before summing.
    container.write_u16_le(COMPLEMENT_OFFSET, 0xFFFF)?;
    container.write_u16_le(CHECKSUM_OFFSET, 0x0000)?;
    let checksum: u16 = compute_checksum(container.working());
    container.write_u16_le(COMPLEMENT_OFFSET, checksum ^ 0xFFFF)?;
    container.write_u16_le(CHECKSUM_OFFSET, checksum)?;
    debug!("Header checksum set to 0x{:04X}", checksum);
    Ok(checksum)
}
