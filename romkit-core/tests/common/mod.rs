//! Test Utilities
//!
//! Synthetic cartridge images, character tables and pointer tables shared by the
//! integration tests.
#![allow(dead_code)]

use romkit_core::rom::{Container, BANK_SIZE};
use romkit_core::text::CharTable;

/// Smallest accepted image: four banks.
pub const ROM_SIZE: usize = 4 * BANK_SIZE;

/// An image of `len` zero bytes.
pub fn blank_image(len: usize) -> Vec<u8> {
    vec![0u8; len]
}

/// An image whose bytes vary with their offset, so misplaced reads show up.
pub fn patterned_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(7) ^ (i >> 9)) as u8).collect()
}

/// Prefix a 512-byte copier header.
pub fn with_copier_header(image: &[u8]) -> Vec<u8> {
    let mut bytes: Vec<u8> = vec![0xAA; 512];
    bytes.extend_from_slice(image);
    bytes
}

pub fn container(image: Vec<u8>) -> Container {
    Container::from_bytes(image).expect("synthetic image has an accepted size")
}

pub fn blank_container() -> Container {
    container(blank_image(ROM_SIZE))
}

/// Table text for a small ASCII-like encoding:
/// `00` terminator, `01` line break, `02` a one-parameter control, `06` space,
/// `20` the multigraph "the ", lowercase and uppercase letters at their ASCII codes.
pub fn sample_table_text() -> String {
    let mut text: String = String::from("# sample table\n/00=[END]\n*01=[LINE]\n02=[SOUND:1]\n06= \n20=the \n");
    text.push_str("2E=.\n21=!\n3F=?\n");
    for c in 'a'..='z' {
        text.push_str(&format!("{:02X}={}\n", c as u32, c));
    }
    for c in 'A'..='Z' {
        text.push_str(&format!("{:02X}={}\n", c as u32, c));
    }
    text
}

pub fn sample_table() -> CharTable {
    CharTable::parse(&sample_table_text()).expect("sample table parses")
}

/// Encode ASCII text with the sample table, terminator appended.
pub fn sample_bytes(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text
        .bytes()
        .map(|b| if b == b' ' { 0x06 } else { b })
        .collect();
    bytes.push(0x00);
    bytes
}

/// Write a 2-byte pointer table for bank 0 at `table_offset`.
pub fn write_short_pointers(image: &mut [u8], table_offset: usize, payload_offsets: &[usize]) {
    for (i, &offset) in payload_offsets.iter().enumerate() {
        let word: u16 = ((offset % BANK_SIZE) as u16) | 0x8000;
        image[table_offset + i * 2..table_offset + i * 2 + 2].copy_from_slice(&word.to_le_bytes());
    }
}

/// Write a 3-byte pointer table at `table_offset`.
pub fn write_long_pointers(image: &mut [u8], table_offset: usize, payload_offsets: &[usize]) {
    for (i, &offset) in payload_offsets.iter().enumerate() {
        let bank: u32 = (offset / BANK_SIZE) as u32;
        let raw: u32 = (bank << 16) | ((offset % BANK_SIZE) as u32 | 0x8000);
        image[table_offset + i * 3..table_offset + i * 3 + 3].copy_from_slice(&raw.to_le_bytes()[..3]);
    }
}
