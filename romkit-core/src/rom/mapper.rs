//! LoROM Address Mapper
//!
//! Translates between 24-bit cartridge addresses (as stored in pointer tables inside the
//! image) and linear offsets into the image file.
//!
//! # Mapping
//! Each 32 KiB bank occupies the upper half of a 64 KiB address window:
//! `linear = (bank & 0x7F) * 0x8000 + (offset - 0x8000)`. Banks with the high bit set
//! mirror their low-bit counterparts, so `$83:8000` and `$03:8000` are the same byte.
//!
//! # Copier Headers
//! Some dumps carry a 512-byte prefix written by cartridge copiers. It is detected by the
//! length rule `len % 1024 == 512` and excluded from the logical image.

use crate::error::{RomError, RomResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of a LoROM bank in the image.
pub const BANK_SIZE: usize = 0x8000;
/// Size of the optional copier header.
pub const COPIER_HEADER_SIZE: usize = 512;
/// Smallest accepted logical image.
pub const MIN_ROM_SIZE: usize = 128 * 1024;
/// Largest accepted logical image.
pub const MAX_ROM_SIZE: usize = 6 * 1024 * 1024;

/// A 24-bit cartridge address, `bank:offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CartAddress(u32);

impl CartAddress {
    /// Build an address from its bank and 16-bit offset.
    #[inline]
    pub const fn new(bank: u8, offset: u16) -> Self {
        Self(((bank as u32) << 16) | offset as u32)
    }

    /// Build an address from a raw 24-bit value; bits above 23 are discarded.
    #[inline]
    pub const fn from_u24(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    #[inline]
    pub const fn bank(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn offset(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The mirror-free form of this address (bank high bit cleared).
    #[inline]
    pub const fn canonical(self) -> Self {
        Self(self.0 & 0x007F_FFFF)
    }

    /// Whether the offset half falls in the ROM window of its bank.
    #[inline]
    pub const fn is_rom_window(self) -> bool {
        self.offset() >= 0x8000
    }
}

impl fmt::Display for CartAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:02X}:{:04X}", self.bank(), self.offset())
    }
}

impl FromStr for CartAddress {
    type Err = RomError;

    /// Accepts `$BB:OOOO`, `BB:OOOO`, `$BBOOOO` and `0xBBOOOO`.
    fn from_str(s: &str) -> RomResult<Self> {
        let trimmed: &str = s.trim();
        let body: &str = trimmed
            .strip_prefix('$')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bad = || RomError::config(format!("invalid cartridge address {:?}", s));
        if let Some((bank, offset)) = body.split_once(':') {
            let bank: u8 = u8::from_str_radix(bank, 16).map_err(|_| bad())?;
            let offset: u16 = u16::from_str_radix(offset, 16).map_err(|_| bad())?;
            Ok(Self::new(bank, offset))
        } else {
            let raw: u32 = u32::from_str_radix(body, 16).map_err(|_| bad())?;
            if raw > 0x00FF_FFFF {
                return Err(bad());
            }
            Ok(Self::from_u24(raw))
        }
    }
}

impl Serialize for CartAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CartAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text: String = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// LoROM mapper for one image.
///
/// Linear offsets include the copier header (they index the file as stored); logical
/// offsets exclude it (they index the cartridge contents).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapper {
    header_len: usize,
    logical_len: usize,
}

impl Mapper {
    /// Inspect a file length and build the mapper for it.
    ///
    /// # Errors
    /// Returns `InvalidCartridgeSize` when the logical size is not a multiple of 32 KiB in
    /// `[128 KiB, 6 MiB]`.
    pub fn open(file_len: usize) -> RomResult<Self> {
        let header_len: usize = if file_len % 1024 == COPIER_HEADER_SIZE {
            COPIER_HEADER_SIZE
        } else {
            0
        };
        let logical_len: usize = file_len - header_len;
        if logical_len % BANK_SIZE != 0 || !(MIN_ROM_SIZE..=MAX_ROM_SIZE).contains(&logical_len) {
            return Err(RomError::cartridge_size(file_len, header_len));
        }
        Ok(Self {
            header_len,
            logical_len,
        })
    }

    /// Mapper for a headerless buffer of exactly `logical_len` bytes, skipping size rules.
    ///
    /// Used for synthetic images and for images grown past their opened size.
    pub fn unchecked(logical_len: usize) -> Self {
        Self {
            header_len: 0,
            logical_len,
        }
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[inline]
    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    #[inline]
    pub fn has_header(&self) -> bool {
        self.header_len != 0
    }

    pub(crate) fn set_logical_len(&mut self, logical_len: usize) {
        self.logical_len = logical_len;
    }

    /// Translate a cartridge address to a logical (header-free) offset.
    pub fn to_logical(&self, address: CartAddress) -> RomResult<usize> {
        if !address.is_rom_window() {
            return Err(RomError::AddressOutOfRange {
                address: address.raw(),
                reason: "offset below $8000 addresses RAM or hardware registers",
            });
        }
        let canonical: CartAddress = address.canonical();
        let logical: usize =
            canonical.bank() as usize * BANK_SIZE + (canonical.offset() as usize - 0x8000);
        if logical >= self.logical_len {
            return Err(RomError::AddressOutOfRange {
                address: address.raw(),
                reason: "address lies past the end of the image",
            });
        }
        Ok(logical)
    }

    /// Translate a cartridge address to a linear file offset (header included).
    pub fn to_linear(&self, address: CartAddress) -> RomResult<usize> {
        Ok(self.to_logical(address)? + self.header_len)
    }

    /// Translate a logical offset back to its canonical cartridge address.
    pub fn from_logical(&self, logical: usize) -> RomResult<CartAddress> {
        if logical >= self.logical_len || logical >= 0x80 * BANK_SIZE {
            return Err(RomError::out_of_bounds(logical, 1, self.logical_len));
        }
        let bank: u8 = (logical / BANK_SIZE) as u8;
        let offset: u16 = (logical % BANK_SIZE) as u16 | 0x8000;
        Ok(CartAddress::new(bank, offset))
    }

    /// Translate a linear file offset back to its canonical cartridge address.
    pub fn from_linear(&self, linear: usize) -> RomResult<CartAddress> {
        if linear < self.header_len {
            return Err(RomError::AddressOutOfRange {
                address: linear as u32,
                reason: "offset lies inside the copier header",
            });
        }
        self.from_logical(linear - self.header_len)
    }
}
