//! Planar Tile Codec
//!
//! Tiles are 8x8 grids of palette indices stored as bitplanes. Planes are grouped in pairs:
//! within a pair, the two planes of each row are interleaved (`row0.p0, row0.p1, row1.p0,
//! ...`), and successive pairs follow each other 16 bytes apart. Three-bit tiles store a
//! third plane as one byte per row after the first pair.
//!
//! # Layout (4 bpp)
//! ```text
//! bytes 0..16   planes 0+1, two bytes per row
//! bytes 16..32  planes 2+3, two bytes per row
//! ```

use crate::error::{RomError, RomResult};

/// Colour depth of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BitDepth {
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "8")]
    Eight,
}

impl BitDepth {
    /// Parse a bits-per-pixel count.
    pub fn from_bpp(bpp: u8) -> Option<Self> {
        match bpp {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    #[inline]
    pub fn bits(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    #[inline]
    pub fn bytes_per_tile(self) -> usize {
        self.bits() * 8
    }

    #[inline]
    pub fn colors(self) -> usize {
        1 << self.bits()
    }
}

/// An 8x8 tile of palette indices, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pixels: [u8; 64],
}

impl Default for Tile {
    fn default() -> Self {
        Self { pixels: [0u8; 64] }
    }
}

impl Tile {
    pub fn new(pixels: [u8; 64]) -> Self {
        Self { pixels }
    }

    /// A tile with every pixel set to `index`.
    pub fn filled(index: u8) -> Self {
        Self { pixels: [index; 64] }
    }

    /// Pixel index at `(x, y)`, or `None` outside the 8x8 grid.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        (x < 8 && y < 8).then(|| self.pixels[y * 8 + x])
    }

    /// # Errors
    /// `OutOfBounds` outside the 8x8 grid.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, index: u8) -> RomResult<()> {
        if x >= 8 || y >= 8 {
            return Err(RomError::out_of_bounds(y.saturating_mul(8).saturating_add(x), 1, 64));
        }
        self.pixels[y * 8 + x] = index;
        Ok(())
    }

    /// Coordinates wrap within the tile.
    #[inline]
    pub(crate) fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[(y & 7) * 8 + (x & 7)]
    }

    #[inline]
    pub(crate) fn put(&mut self, x: usize, y: usize, index: u8) {
        self.pixels[(y & 7) * 8 + (x & 7)] = index;
    }

    pub fn pixels(&self) -> &[u8; 64] {
        &self.pixels
    }

    /// Mirror left-to-right.
    pub fn flip_horizontal(&self) -> Self {
        let mut out: Tile = Tile::default();
        for y in 0..8 {
            for x in 0..8 {
                out.put(7 - x, y, self.pixel(x, y));
            }
        }
        out
    }

    /// Mirror top-to-bottom.
    pub fn flip_vertical(&self) -> Self {
        let mut out: Tile = Tile::default();
        for y in 0..8 {
            for x in 0..8 {
                out.put(x, 7 - y, self.pixel(x, y));
            }
        }
        out
    }

    /// Largest index used by any pixel.
    pub fn max_index(&self) -> u8 {
        self.pixels.iter().copied().max().unwrap_or(0)
    }
}

/// Byte offset of `plane` for `row` within a tile of the given depth.
#[inline]
fn plane_offset(depth: BitDepth, plane: usize, row: usize) -> usize {
    match (depth, plane) {
        // The lone third plane is packed one byte per row.
        (BitDepth::Three, 2) => 16 + row,
        _ => (plane / 2) * 16 + row * 2 + (plane & 1),
    }
}

/// Stateless planar tile encoder/decoder.
pub struct TileCodec;

impl TileCodec {
    /// Decode one tile of any depth.
    ///
    /// # Errors
    /// `OutOfBounds` if `bytes` is shorter than one tile.
    pub fn decode(depth: BitDepth, bytes: &[u8]) -> RomResult<Tile> {
        let size: usize = depth.bytes_per_tile();
        if bytes.len() < size {
            return Err(RomError::out_of_bounds(0, size, bytes.len()));
        }
        let mut tile: Tile = Tile::default();
        for y in 0..8 {
            for plane in 0..depth.bits() {
                let row_bits: u8 = bytes[plane_offset(depth, plane, y)];
                for x in 0..8 {
                    let bit: u8 = (row_bits >> (7 - x)) & 1;
                    tile.pixels[y * 8 + x] |= bit << plane;
                }
            }
        }
        Ok(tile)
    }

    /// Encode one tile of any depth.
    ///
    /// # Errors
    /// `PixelOutOfRange` if a pixel index does not fit the depth.
    pub fn encode(depth: BitDepth, tile: &Tile) -> RomResult<Vec<u8>> {
        let colors: usize = depth.colors();
        if let Some(pos) = tile.pixels.iter().position(|&p| p as usize >= colors) {
            return Err(RomError::PixelOutOfRange {
                x: pos % 8,
                y: pos / 8,
                index: tile.pixels[pos],
                colors,
            });
        }
        let mut out: Vec<u8> = vec![0u8; depth.bytes_per_tile()];
        for y in 0..8 {
            for plane in 0..depth.bits() {
                let mut row_bits: u8 = 0;
                for x in 0..8 {
                    row_bits |= ((tile.pixel(x, y) >> plane) & 1) << (7 - x);
                }
                out[plane_offset(depth, plane, y)] = row_bits;
            }
        }
        Ok(out)
    }

    pub fn decode_2bpp(bytes: &[u8]) -> RomResult<Tile> {
        Self::decode(BitDepth::Two, bytes)
    }

    pub fn decode_3bpp(bytes: &[u8]) -> RomResult<Tile> {
        Self::decode(BitDepth::Three, bytes)
    }

    pub fn decode_4bpp(bytes: &[u8]) -> RomResult<Tile> {
        Self::decode(BitDepth::Four, bytes)
    }

    pub fn decode_8bpp(bytes: &[u8]) -> RomResult<Tile> {
        Self::decode(BitDepth::Eight, bytes)
    }

    pub fn encode_2bpp(tile: &Tile) -> RomResult<Vec<u8>> {
        Self::encode(BitDepth::Two, tile)
    }

    pub fn encode_3bpp(tile: &Tile) -> RomResult<Vec<u8>> {
        Self::encode(BitDepth::Three, tile)
    }

    pub fn encode_4bpp(tile: &Tile) -> RomResult<Vec<u8>> {
        Self::encode(BitDepth::Four, tile)
    }

    pub fn encode_8bpp(tile: &Tile) -> RomResult<Vec<u8>> {
        Self::encode(BitDepth::Eight, tile)
    }

    /// Decode consecutive tiles; a trailing partial tile is ignored.
    pub fn decode_many(depth: BitDepth, bytes: &[u8]) -> RomResult<Vec<Tile>> {
        bytes
            .chunks_exact(depth.bytes_per_tile())
            .map(|chunk| Self::decode(depth, chunk))
            .collect()
    }

    /// Encode tiles back to back.
    pub fn encode_many(depth: BitDepth, tiles: &[Tile]) -> RomResult<Vec<u8>> {
        let mut out: Vec<u8> = Vec::with_capacity(tiles.len() * depth.bytes_per_tile());
        for tile in tiles {
            out.extend_from_slice(&Self::encode(depth, tile)?);
        }
        Ok(out)
    }
}
