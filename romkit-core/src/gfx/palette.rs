//! BGR555 colours and palettes.
//!
//! A colour is a little-endian word `0bbbbbgggggrrrrr`. Channels widen to 8 bits with
//! `c8 = (c5 << 3) | (c5 >> 2)` so that 31 maps to 255, and narrow back with `c8 >> 3`.

use crate::error::{RomError, RomResult};
use serde::{Deserialize, Serialize};

/// Colour drawn for palette indices that have no entry.
pub const SENTINEL: Rgb = Rgb {
    r: 0xFF,
    g: 0x00,
    b: 0xFF,
};

/// 8-bit-per-channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// A packed 15-bit colour word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bgr555(pub u16);

#[inline]
fn expand5(c5: u16) -> u8 {
    ((c5 << 3) | (c5 >> 2)) as u8
}

impl Bgr555 {
    /// Build from 5-bit channels (each masked to 5 bits).
    pub fn from_channels(r5: u8, g5: u8, b5: u8) -> Self {
        let r: u16 = (r5 & 0x1F) as u16;
        let g: u16 = (g5 & 0x1F) as u16;
        let b: u16 = (b5 & 0x1F) as u16;
        Self(r | (g << 5) | (b << 10))
    }

    #[inline]
    pub fn r5(self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    #[inline]
    pub fn g5(self) -> u8 {
        ((self.0 >> 5) & 0x1F) as u8
    }

    #[inline]
    pub fn b5(self) -> u8 {
        ((self.0 >> 10) & 0x1F) as u8
    }

    /// Widen to 8-bit channels.
    pub fn to_rgb(self) -> Rgb {
        Rgb {
            r: expand5(self.r5() as u16),
            g: expand5(self.g5() as u16),
            b: expand5(self.b5() as u16),
        }
    }

    /// Narrow 8-bit channels to 5 bits each (low three bits dropped).
    pub fn from_rgb(rgb: Rgb) -> Self {
        Self::from_channels(rgb.r >> 3, rgb.g >> 3, rgb.b >> 3)
    }

    /// Like [`Bgr555::from_rgb`] but rejects colours that do not widen back unchanged.
    pub fn from_rgb_exact(rgb: Rgb) -> RomResult<Self> {
        let color: Bgr555 = Self::from_rgb(rgb);
        if color.to_rgb() != rgb {
            return Err(RomError::UnmappedColor {
                r: rgb.r,
                g: rgb.g,
                b: rgb.b,
                reason: "not representable as a 15-bit colour",
            });
        }
        Ok(color)
    }

    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes) & 0x7FFF)
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

/// Decode one colour word.
pub fn decode_color(word: u16) -> Rgb {
    Bgr555(word & 0x7FFF).to_rgb()
}

/// Encode one colour to its word.
pub fn encode_color(rgb: Rgb) -> u16 {
    Bgr555::from_rgb(rgb).0
}

/// An ordered list of colours (typically 4, 16 or 256).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Palette {
    colors: Vec<Bgr555>,
}

impl Palette {
    pub fn new(colors: Vec<Bgr555>) -> Self {
        Self { colors }
    }

    /// Decode `count` colours from little-endian words.
    ///
    /// # Errors
    /// `OutOfBounds` if `bytes` holds fewer than `count` words.
    pub fn decode(bytes: &[u8], count: usize) -> RomResult<Self> {
        let needed: usize = count * 2;
        if bytes.len() < needed {
            return Err(RomError::out_of_bounds(0, needed, bytes.len()));
        }
        let colors: Vec<Bgr555> = bytes[..needed]
            .chunks_exact(2)
            .map(|pair| Bgr555::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { colors })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    pub fn to_rgb(&self) -> Vec<Rgb> {
        self.colors.iter().map(|c| c.to_rgb()).collect()
    }

    /// Build from 8-bit colours; each must survive the 5-bit round trip.
    pub fn from_rgb(colors: &[Rgb]) -> RomResult<Self> {
        let colors: Vec<Bgr555> = colors
            .iter()
            .map(|&c| Bgr555::from_rgb_exact(c))
            .collect::<RomResult<_>>()?;
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Bgr555> {
        self.colors.get(index).copied()
    }

    /// Colour for a pixel index, or the magenta sentinel when out of range.
    #[inline]
    pub fn rgb_or_sentinel(&self, index: usize) -> Rgb {
        self.colors.get(index).map(|c| c.to_rgb()).unwrap_or(SENTINEL)
    }

    /// Slice out sub-palette `index` of `size` colours (e.g. the 4th 16-colour row).
    pub fn sub_palette(&self, index: usize, size: usize) -> Palette {
        let start: usize = (index * size).min(self.colors.len());
        let end: usize = (start + size).min(self.colors.len());
        Palette {
            colors: self.colors[start..end].to_vec(),
        }
    }

    /// Index of the entry whose widened colour equals `rgb`.
    pub fn position(&self, rgb: Rgb) -> Option<usize> {
        self.colors.iter().position(|c| c.to_rgb() == rgb)
    }

    pub fn colors(&self) -> &[Bgr555] {
        &self.colors
    }
}
